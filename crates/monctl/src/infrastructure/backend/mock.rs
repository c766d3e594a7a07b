//! Scriptable in-memory backend for tests.
//!
//! Lets tests plug, unplug, renumber and reconfigure monitors between
//! refreshes without a display server.  Clones share the same state, so a test
//! can keep one handle while the registry (or the watchdog thread) owns
//! another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use monctl_core::{DisplayMode, MonitorState, Orientation, PlatformRules, Point, PowerState, Size};

use super::{BackendError, MonitorBackend, MonitorHandle, StateUpdate, UpdateField};

struct MockMonitor {
    handle: MonitorHandle,
    state: MonitorState,
}

#[derive(Default)]
struct MockState {
    monitors: Vec<MockMonitor>,
    next_id: u64,
    rejected: HashSet<UpdateField>,
    pending_list_failures: u32,
    list_calls: usize,
    set_calls: Vec<(String, StateUpdate)>,
    mouse: Option<Point>,
    rules: Option<PlatformRules>,
}

/// In-memory [`MonitorBackend`] driven by the test.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

/// A monitor state with a single `width`×`height`@60 mode.
pub fn mock_state(width: u32, height: u32, position: Point, is_primary: bool) -> MonitorState {
    let mode = DisplayMode::new(width, height, 60.0);
    MonitorState {
        position,
        size: Size::new(width, height),
        mode: Some(mode),
        all_modes: vec![mode],
        default_mode: Some(mode),
        scale: Some((100.0, 100.0)),
        dpi: Some((96.0, 96.0)),
        orientation: Some(Orientation::Normal),
        colordepth: Some(24),
        is_primary,
        ..MonitorState::default()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two 1920×1080 monitors side by side, `"A"` primary at the origin and
    /// `"B"` to its right.
    pub fn dual_1080p() -> Self {
        let backend = Self::new();
        backend.plug("A", mock_state(1920, 1080, Point::ORIGIN, true));
        backend.plug("B", mock_state(1920, 1080, Point::new(1920, 0), false));
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a monitor at the end of the enumeration order with a fresh native id.
    pub fn plug(&self, name: &str, mut state: MonitorState) {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if state.system_name.is_empty() {
            state.system_name = name.to_string();
        }
        inner.monitors.push(MockMonitor {
            handle: MonitorHandle::new(name, id),
            state,
        });
    }

    /// Removes a monitor, returning its last state.
    pub fn unplug(&self, name: &str) -> Option<MonitorState> {
        let mut inner = self.lock();
        let idx = inner.monitors.iter().position(|m| m.handle.name == name)?;
        Some(inner.monitors.remove(idx).state)
    }

    /// Mutates a monitor's state in place, as if changed outside the process.
    pub fn update(&self, name: &str, f: impl FnOnce(&mut MonitorState)) {
        let mut inner = self.lock();
        if let Some(m) = inner.monitors.iter_mut().find(|m| m.handle.name == name) {
            f(&mut m.state);
        }
    }

    /// Gives a monitor a new native id, invalidating handles to the old one.
    pub fn renumber(&self, name: &str) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let id = inner.next_id;
        if let Some(m) = inner.monitors.iter_mut().find(|m| m.handle.name == name) {
            m.handle.native_id = id;
            inner.next_id += 1;
        }
    }

    /// Re-enumerates a monitor under a different name (and native id).
    pub fn rename(&self, old: &str, new: &str) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let id = inner.next_id;
        if let Some(m) = inner.monitors.iter_mut().find(|m| m.handle.name == old) {
            m.handle = MonitorHandle::new(new, id);
            inner.next_id += 1;
        }
    }

    /// Makes every later write touching `field` fail with `Rejected`.
    pub fn reject(&self, field: UpdateField) {
        self.lock().rejected.insert(field);
    }

    /// Makes the next `count` calls to `list_monitors` fail.
    pub fn fail_next_list(&self, count: u32) {
        self.lock().pending_list_failures = count;
    }

    pub fn set_mouse(&self, position: Option<Point>) {
        self.lock().mouse = position;
    }

    pub fn set_rules(&self, rules: PlatformRules) {
        self.lock().rules = Some(rules);
    }

    /// Current state of a monitor, bypassing any registry.
    pub fn state(&self, name: &str) -> Option<MonitorState> {
        self.lock()
            .monitors
            .iter()
            .find(|m| m.handle.name == name)
            .map(|m| m.state.clone())
    }

    /// Number of `list_monitors` calls so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Every successful `set_state` call so far, as `(monitor name, update)`.
    pub fn set_calls(&self) -> Vec<(String, StateUpdate)> {
        self.lock().set_calls.clone()
    }

    pub fn clear_set_calls(&self) {
        self.lock().set_calls.clear();
    }
}

fn apply_update(state: &mut MonitorState, update: &StateUpdate) -> Result<(), BackendError> {
    if let Some(mode) = update.mode {
        if !state.all_modes.contains(&mode) {
            return Err(BackendError::Rejected {
                field: UpdateField::Mode.to_string(),
                reason: format!("{mode} is not offered by this monitor"),
            });
        }
        state.mode = Some(mode);
        let portrait = state.orientation.is_some_and(|o| o.is_portrait());
        state.size = if portrait {
            mode.size().transposed()
        } else {
            mode.size()
        };
    }
    if let Some(orientation) = update.orientation {
        let was_portrait = state.orientation.is_some_and(|o| o.is_portrait());
        if was_portrait != orientation.is_portrait() {
            state.size = state.size.transposed();
        }
        state.orientation = Some(orientation);
    }
    if let Some(scale) = update.scale {
        state.scale = Some(scale);
    }
    if let Some(position) = update.position {
        state.position = position;
    }
    if let Some(power) = update.power {
        state.power = power;
    }
    if let Some(brightness) = update.brightness {
        state.brightness = Some(brightness);
    }
    if let Some(contrast) = update.contrast {
        state.contrast = Some(contrast);
    }
    Ok(())
}

impl MonitorBackend for MockBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        if inner.pending_list_failures > 0 {
            inner.pending_list_failures -= 1;
            return Err(BackendError::Platform("scripted enumeration failure".to_string()));
        }
        Ok(inner.monitors.iter().map(|m| m.handle.clone()).collect())
    }

    fn get_state(&self, handle: &MonitorHandle) -> Result<MonitorState, BackendError> {
        self.lock()
            .monitors
            .iter()
            .find(|m| m.handle == *handle)
            .map(|m| m.state.clone())
            .ok_or_else(|| BackendError::InvalidHandle(handle.to_string()))
    }

    fn set_state(&self, handle: &MonitorHandle, update: &StateUpdate) -> Result<(), BackendError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(field) = update.fields().into_iter().find(|f| inner.rejected.contains(f)) {
            return Err(BackendError::Rejected {
                field: field.to_string(),
                reason: "scripted rejection".to_string(),
            });
        }

        let idx = inner
            .monitors
            .iter()
            .position(|m| m.handle == *handle)
            .ok_or_else(|| BackendError::InvalidHandle(handle.to_string()))?;

        let mut next = inner.monitors[idx].state.clone();
        apply_update(&mut next, update)?;
        inner.monitors[idx].state = next;

        if let Some(primary) = update.primary {
            if primary {
                for (i, m) in inner.monitors.iter_mut().enumerate() {
                    m.state.is_primary = i == idx;
                }
            } else {
                inner.monitors[idx].state.is_primary = false;
            }
        }

        inner.set_calls.push((handle.name.clone(), update.clone()));
        Ok(())
    }

    fn mouse_position(&self) -> Result<Option<Point>, BackendError> {
        Ok(self.lock().mouse)
    }

    fn rules(&self) -> PlatformRules {
        self.lock().rules.unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lists_plugged_monitors_in_order() {
        // Arrange
        let backend = MockBackend::dual_1080p();

        // Act
        let handles = backend.list_monitors().expect("list");

        // Assert
        let names: Vec<&str> = handles.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_ne!(handles[0].native_id, handles[1].native_id);
    }

    #[test]
    fn test_mock_backend_renumber_invalidates_old_handle() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let old = backend.list_monitors().expect("list")[1].clone();

        // Act
        backend.renumber("B");

        // Assert
        assert!(matches!(backend.get_state(&old), Err(BackendError::InvalidHandle(_))));
        let new = backend.list_monitors().expect("list")[1].clone();
        assert_eq!(new.name, "B");
        assert!(backend.get_state(&new).is_ok());
    }

    #[test]
    fn test_mock_backend_set_primary_clears_previous_primary() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let b = backend.list_monitors().expect("list")[1].clone();

        // Act
        backend
            .set_state(&b, &StateUpdate::default().with_primary(true))
            .expect("set primary");

        // Assert
        assert!(!backend.state("A").expect("A").is_primary);
        assert!(backend.state("B").expect("B").is_primary);
    }

    #[test]
    fn test_mock_backend_rotation_swaps_size() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let a = backend.list_monitors().expect("list")[0].clone();

        // Act
        backend
            .set_state(&a, &StateUpdate::default().with_orientation(Orientation::Left))
            .expect("rotate");

        // Assert
        assert_eq!(backend.state("A").expect("A").size, Size::new(1080, 1920));
    }

    #[test]
    fn test_mock_backend_rejects_unknown_mode() {
        let backend = MockBackend::dual_1080p();
        let a = backend.list_monitors().expect("list")[0].clone();

        let result = backend.set_state(
            &a,
            &StateUpdate::default().with_mode(DisplayMode::new(800, 600, 60.0)),
        );

        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert!(backend.set_calls().is_empty());
    }

    #[test]
    fn test_mock_backend_scripted_list_failure_is_consumed() {
        let backend = MockBackend::dual_1080p();
        backend.fail_next_list(1);

        assert!(backend.list_monitors().is_err());
        assert!(backend.list_monitors().is_ok());
        assert_eq!(backend.list_calls(), 2);
    }

    #[test]
    fn test_mock_backend_reject_blocks_field() {
        let backend = MockBackend::dual_1080p();
        backend.reject(UpdateField::Position);
        let a = backend.list_monitors().expect("list")[0].clone();

        let result = backend.set_state(&a, &StateUpdate::default().with_position(Point::new(5, 5)));

        assert!(matches!(result, Err(BackendError::Rejected { field, .. }) if field == "position"));
        assert_eq!(backend.state("A").expect("A").position, Point::ORIGIN);
    }

    #[test]
    fn test_mock_backend_power_update_is_applied() {
        let backend = MockBackend::dual_1080p();
        let a = backend.list_monitors().expect("list")[0].clone();

        backend
            .set_state(&a, &StateUpdate::default().with_power(PowerState::Suspended))
            .expect("suspend");

        assert_eq!(backend.state("A").expect("A").power, PowerState::Suspended);
    }
}
