//! Domain types for monctl.
//!
//! Pure values and pure functions: nothing in here performs I/O, so every
//! type can be built and tested on any platform.

/// Solver that turns relative placements into absolute positions.
pub mod arrangement;

/// Points, sizes and rectangles.
pub mod geometry;

/// Monitor state snapshot and platform placement rules.
pub mod monitor;
