//! Error type surfaced by the public monitor API.
//!
//! Read paths never return these: a query the platform cannot answer yields
//! `None` or an empty list.  Write paths return one of the variants below so
//! callers can branch on capability.
//!
//! | Variant                 | Recoverable by                                   |
//! |-------------------------|--------------------------------------------------|
//! | `InvalidHandle`         | looking the monitor up again by name             |
//! | `UnknownMonitor`        | fixing the name, or waiting for the plug event   |
//! | `Arrangement`           | fixing the arrangement; nothing was written      |
//! | `UnsupportedOperation`  | nothing; the platform or hardware lacks it       |
//! | `ModeNotAvailable`      | picking a mode from `Monitor::all_modes`         |
//! | `PartialRestoreFailure` | inspecting the report; other fields were applied |
//! | `Spawn`                 | retrying; the OS refused a thread                |
//! | `Backend`               | retrying; usually a transient platform failure   |

use monctl_core::{ArrangementError, DisplayMode};
use thiserror::Error;

use crate::application::snapshot::RestoreReport;
use crate::infrastructure::backend::BackendError;

/// Errors returned by [`Monitor`](crate::application::registry::Monitor)
/// setters and [`MonitorManager`](crate::application::manager::MonitorManager)
/// control operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The monitor is no longer attached (or its handle was recycled and could
    /// not be re-bound).  Look it up again by name.
    #[error("monitor {0} is no longer available")]
    InvalidHandle(String),

    /// No currently attached monitor has this name.
    #[error("no monitor named {0}")]
    UnknownMonitor(String),

    /// The arrangement was rejected before anything was changed.
    #[error(transparent)]
    Arrangement(#[from] ArrangementError),

    /// The platform or the monitor lacks this capability.
    #[error("{operation} is not supported for monitor {monitor}: {reason}")]
    UnsupportedOperation {
        monitor: String,
        operation: String,
        reason: String,
    },

    /// The requested mode is not in the monitor's mode list.
    #[error("mode {mode} is not available on monitor {monitor}")]
    ModeNotAvailable { monitor: String, mode: DisplayMode },

    /// Some fields of a setup could not be restored.  The report lists every
    /// field, restored or not.
    #[error("{} of {} setup fields could not be restored", .0.failures().count(), .0.results.len())]
    PartialRestoreFailure(RestoreReport),

    /// The watchdog thread could not be started.
    #[error("failed to start the watchdog thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl MonitorError {
    /// Maps a backend error raised while operating on `monitor`.
    pub fn from_backend(monitor: &str, operation: &str, err: BackendError) -> Self {
        match err {
            BackendError::Unsupported(reason) => MonitorError::UnsupportedOperation {
                monitor: monitor.to_string(),
                operation: operation.to_string(),
                reason,
            },
            BackendError::InvalidHandle(_) => MonitorError::InvalidHandle(monitor.to_string()),
            other => MonitorError::Backend(other),
        }
    }

    /// `true` for errors that mean "look the monitor up again by name".
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, MonitorError::InvalidHandle(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_backend_maps_unsupported_to_unsupported_operation() {
        let err = MonitorError::from_backend(
            "HDMI-1",
            "set_scale",
            BackendError::Unsupported("scale".to_string()),
        );
        assert!(matches!(
            err,
            MonitorError::UnsupportedOperation { ref monitor, ref operation, .. }
                if monitor == "HDMI-1" && operation == "set_scale"
        ));
    }

    #[test]
    fn test_from_backend_maps_invalid_handle_to_stale_monitor() {
        let err = MonitorError::from_backend(
            "HDMI-1",
            "set_mode",
            BackendError::InvalidHandle("HDMI-1#4".to_string()),
        );
        assert!(err.is_stale_handle());
        assert_eq!(err.to_string(), "monitor HDMI-1 is no longer available");
    }

    #[test]
    fn test_from_backend_keeps_other_errors() {
        let err = MonitorError::from_backend(
            "HDMI-1",
            "set_position",
            BackendError::Platform("boom".to_string()),
        );
        assert!(matches!(err, MonitorError::Backend(BackendError::Platform(_))));
    }
}
