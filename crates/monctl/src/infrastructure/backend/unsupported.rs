//! Backend for targets without a native implementation.

use monctl_core::{MonitorState, Point};

use super::{BackendError, MonitorBackend, MonitorHandle, StateUpdate};

/// Reports [`BackendError::Unsupported`] for every operation.
pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnsupportedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported<T>(what: &str) -> Result<T, BackendError> {
    Err(BackendError::Unsupported(format!(
        "{what} on {}",
        std::env::consts::OS
    )))
}

impl MonitorBackend for UnsupportedBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError> {
        unsupported("monitor enumeration")
    }

    fn get_state(&self, _handle: &MonitorHandle) -> Result<MonitorState, BackendError> {
        unsupported("monitor queries")
    }

    fn set_state(&self, _handle: &MonitorHandle, _update: &StateUpdate) -> Result<(), BackendError> {
        unsupported("monitor control")
    }

    fn mouse_position(&self) -> Result<Option<Point>, BackendError> {
        unsupported("pointer queries")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_backend_rejects_every_call() {
        let backend = UnsupportedBackend::new();
        let handle = MonitorHandle::new("X", 0);

        assert!(matches!(backend.list_monitors(), Err(BackendError::Unsupported(_))));
        assert!(matches!(backend.get_state(&handle), Err(BackendError::Unsupported(_))));
        assert!(matches!(
            backend.set_state(&handle, &StateUpdate::default()),
            Err(BackendError::Unsupported(_))
        ));
        assert!(matches!(backend.mouse_position(), Err(BackendError::Unsupported(_))));
    }
}
