//! # monctl-core
//!
//! Platform-independent half of monctl: geometry primitives, monitor state
//! value types, and the arrangement solver.
//!
//! This crate has no dependencies on OS APIs.  Everything that talks to a
//! display server lives in the `monctl` crate's infrastructure layer.
//!
//! - **`domain::geometry`** – points, sizes and rectangles in desktop
//!   coordinates.
//! - **`domain::monitor`** – [`MonitorState`], the full property snapshot of a
//!   monitor, plus [`PlatformRules`] describing what a platform allows.
//! - **`domain::arrangement`** – turns a relative [`ArrangementSpec`] into
//!   absolute positions with [`solve`].

pub mod domain;

pub use domain::arrangement::{
    overlapping_pairs, solve, ArrangementEntry, ArrangementError, ArrangementIssue,
    ArrangementSpec, Placement, RelativePosition,
};
pub use domain::geometry::{Bounds, Point, Rect, Size};
pub use domain::monitor::{
    DisplayMode, Dpi, MonitorField, MonitorState, Orientation, PlatformRules, PowerState, Scale,
};
