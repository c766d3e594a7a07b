//! Application layer: identity tracking, change detection and setups.
//!
//! - **`registry`** – [`Monitor`](registry::Monitor) objects and the
//!   [`MonitorRegistry`](registry::MonitorRegistry) that reconciles them with
//!   the backend on every refresh, keeping object identity stable across
//!   property changes, handle recycling and one-refresh enumeration flaps.
//! - **`watchdog`** – the background polling loop that diffs successive
//!   refreshes into plug and property-change events for listeners.
//! - **`snapshot`** – capture and field-by-field restore of a whole setup.
//! - **`manager`** – the [`MonitorManager`](manager::MonitorManager) facade
//!   tying the above together behind the public query and control surface.
//! - **`error`** – [`MonitorError`](error::MonitorError).

pub mod error;
pub mod manager;
pub mod registry;
pub mod snapshot;
pub mod watchdog;
