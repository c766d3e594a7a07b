//! monctl library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does monctl do?
//!
//! monctl keeps a live, identity-stable view of the monitors attached to the
//! machine and lets applications change them:
//!
//! 1. [`MonitorManager`] answers queries (all monitors, primary, monitor at a
//!    point, monitor by name) from a [`MonitorRegistry`] that survives hot-plug
//!    and handle recycling without replacing [`Monitor`] objects.
//! 2. Arrangements are described relative to the primary monitor and solved
//!    into absolute positions by `monctl_core::solve` before anything is
//!    written.
//! 3. Whole setups can be saved and restored field by field.
//! 4. A background [`ChangeWatchdog`] reports plug/unplug and property changes
//!    to registered listeners.
//!
//! ```no_run
//! use monctl::{MonitorManager, RelativePosition};
//!
//! let manager = MonitorManager::native();
//! for monitor in manager.all_monitors() {
//!     println!("{} at {:?}", monitor.name(), monitor.position());
//! }
//! if let Some(laptop) = manager.find_monitor_with_name("eDP-1") {
//!     let primary = manager.primary().map(|m| m.name());
//!     let _ = manager.place_monitor(&laptop.name(), RelativePosition::LeftBottom, primary.as_deref());
//! }
//! ```

/// Application layer: registry, watchdog, setups and the manager facade.
pub mod application;

/// Infrastructure layer: platform backends and TOML storage.
pub mod infrastructure;

pub use application::error::MonitorError;
pub use application::manager::MonitorManager;
pub use application::registry::{Monitor, MonitorRegistry, RefreshResult};
pub use application::snapshot::{
    FieldRestoreResult, MonitorProperties, RestoreOutcome, RestoreReport, Setup, SetupField,
    SetupRecord,
};
pub use application::watchdog::{ChangeEvent, ChangeKind, ChangeWatchdog, ListenerId};
pub use infrastructure::backend::{BackendError, MonitorBackend, MonitorHandle, StateUpdate};
pub use monctl_core::{
    ArrangementError, ArrangementSpec, DisplayMode, Orientation, Placement, PlatformRules, Point,
    PowerState, RelativePosition, Size,
};
