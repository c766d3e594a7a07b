//! macOS backend via Core Graphics (`CGDisplay`).
//!
//! Uses `CGGetActiveDisplayList` to enumerate the active displays and
//! `CGDisplayBounds`, `CGDisplayRotation` and `CGDisplayCopyDisplayMode` to
//! describe each one.  Core Graphics global coordinates already have their
//! origin at the top-left of the main display with Y growing downwards, so no
//! axis flip is needed.
//!
//! Core Graphics exposes no user-facing display names; monitors are named
//! `Display-<CGDirectDisplayID>`, which is unique and stable while the display
//! stays connected.  Display configuration changes are not implemented here:
//! every write returns [`BackendError::Unsupported`].

use core_graphics::display::{CGDirectDisplayID, CGDisplay, CGDisplayMode};
use core_graphics::event::CGEvent;
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use monctl_core::{DisplayMode, MonitorState, Orientation, Point, Size};

use super::{BackendError, MonitorBackend, MonitorHandle, StateUpdate};

/// macOS implementation of [`MonitorBackend`] via Core Graphics.
pub struct CoreGraphicsBackend;

impl CoreGraphicsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoreGraphicsBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn display_name(id: CGDirectDisplayID) -> String {
    format!("Display-{id}")
}

fn to_mode(mode: &CGDisplayMode) -> DisplayMode {
    DisplayMode::new(mode.width() as u32, mode.height() as u32, mode.refresh_rate())
}

impl MonitorBackend for CoreGraphicsBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError> {
        let ids = CGDisplay::active_displays()
            .map_err(|e| BackendError::Platform(format!("CGGetActiveDisplayList failed: {e}")))?;
        Ok(ids
            .into_iter()
            .map(|id| MonitorHandle::new(display_name(id), u64::from(id)))
            .collect())
    }

    fn get_state(&self, handle: &MonitorHandle) -> Result<MonitorState, BackendError> {
        let id = CGDirectDisplayID::try_from(handle.native_id)
            .map_err(|_| BackendError::InvalidHandle(handle.to_string()))?;
        let active = CGDisplay::active_displays()
            .map_err(|e| BackendError::Platform(format!("CGGetActiveDisplayList failed: {e}")))?;
        if !active.contains(&id) {
            return Err(BackendError::InvalidHandle(handle.to_string()));
        }

        let display = CGDisplay::new(id);
        let bounds = display.bounds();
        let size = Size::new(bounds.size.width as u32, bounds.size.height as u32);
        let current = display.display_mode();

        let scale = current.as_ref().and_then(|m| {
            let logical = m.width() as f64;
            (logical > 0.0).then(|| {
                let factor = m.pixel_width() as f64 / logical * 100.0;
                (factor, factor)
            })
        });

        let all_modes = CGDisplayMode::all_display_modes(id, std::ptr::null())
            .map(|modes| {
                let mut list: Vec<DisplayMode> = Vec::new();
                for mode in modes.iter().map(to_mode) {
                    if !list.contains(&mode) {
                        list.push(mode);
                    }
                }
                list
            })
            .unwrap_or_default();

        Ok(MonitorState {
            system_name: display_name(id),
            position: Point::new(bounds.origin.x as i32, bounds.origin.y as i32),
            size,
            mode: current.as_ref().map(to_mode),
            all_modes,
            scale,
            orientation: Orientation::from_degrees(display.rotation()),
            colordepth: current.as_ref().map(|m| m.bit_depth() as u32),
            is_primary: display.is_main(),
            ..MonitorState::default()
        }
        .normalized())
    }

    fn set_state(&self, _handle: &MonitorHandle, update: &StateUpdate) -> Result<(), BackendError> {
        let fields: Vec<String> = update.fields().iter().map(ToString::to_string).collect();
        Err(BackendError::Unsupported(format!(
            "changing {} on macOS",
            fields.join(", ")
        )))
    }

    fn mouse_position(&self) -> Result<Option<Point>, BackendError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| BackendError::Platform("CGEventSourceCreate failed".to_string()))?;
        let event = CGEvent::new(source)
            .map_err(|_| BackendError::Platform("CGEventCreate failed".to_string()))?;
        let location = event.location();
        Ok(Some(Point::new(location.x as i32, location.y as i32)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
