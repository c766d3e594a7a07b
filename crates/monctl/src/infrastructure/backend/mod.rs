//! Platform monitor backends.
//!
//! A [`MonitorBackend`] is the only thing in monctl that talks to the display
//! server.  It answers four questions (which monitors exist, what state is a
//! monitor in, change that state, where is the pointer) and nothing else:
//! identity tracking, diffing and arrangement all happen above it.
//!
//! # Platform implementations
//!
//! Each platform implements [`MonitorBackend`]; the correct one is selected at
//! compile time via `#[cfg(target_os = ...)]` and re-exported as
//! `NativeBackend`:
//!
//! | Module        | OS      | Mechanism                                         |
//! |---------------|---------|---------------------------------------------------|
//! | `linux`       | Linux   | `xrandr` / `xset` commands, Xlib pointer query    |
//! | `windows`     | Windows | `EnumDisplayMonitors` + `EnumDisplaySettingsW`    |
//! | `macos`       | macOS   | `CGGetActiveDisplayList` + `CGDisplayBounds`      |
//! | `unsupported` | other   | reports [`BackendError::Unsupported`] everywhere  |
//!
//! [`MockBackend`] is always compiled (not guarded by `#[cfg]`) so tests on any
//! platform can script plug/unplug sequences without a physical display.

use std::fmt;
use std::sync::Arc;

use monctl_core::{DisplayMode, MonitorState, Orientation, PlatformRules, Point, PowerState, Scale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The platform (or this particular monitor) cannot do this.
    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    /// The handle no longer refers to a monitor the system knows about.
    #[error("monitor handle {0} is no longer valid")]
    InvalidHandle(String),

    /// The system refused the requested value.
    #[error("{field} rejected: {reason}")]
    Rejected { field: String, reason: String },

    /// A native API call failed.
    #[error("platform API error: {0}")]
    Platform(String),

    /// An external command could not be run or exited unsuccessfully.
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

/// Opaque reference to one monitor as the backend currently enumerates it.
///
/// `name` is the stable key.  `native_id` is whatever the OS uses internally
/// (an `HMONITOR`, a `CGDirectDisplayID`, an xrandr output index) and may be
/// recycled after a topology change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHandle {
    pub name: String,
    pub native_id: u64,
}

impl MonitorHandle {
    pub fn new(name: impl Into<String>, native_id: u64) -> Self {
        Self {
            name: name.into(),
            native_id,
        }
    }
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.native_id)
    }
}

/// A field that a [`StateUpdate`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateField {
    Mode,
    Orientation,
    Scale,
    Position,
    Primary,
    Power,
    Brightness,
    Contrast,
}

impl fmt::Display for UpdateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateField::Mode => "mode",
            UpdateField::Orientation => "orientation",
            UpdateField::Scale => "scale",
            UpdateField::Position => "position",
            UpdateField::Primary => "primary",
            UpdateField::Power => "power",
            UpdateField::Brightness => "brightness",
            UpdateField::Contrast => "contrast",
        };
        f.write_str(s)
    }
}

/// Partial monitor state: only the `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub mode: Option<DisplayMode>,
    pub orientation: Option<Orientation>,
    pub scale: Option<Scale>,
    pub position: Option<Point>,
    pub primary: Option<bool>,
    pub power: Option<PowerState>,
    /// 0–100.
    pub brightness: Option<u8>,
    /// 0–100.
    pub contrast: Option<u8>,
}

impl StateUpdate {
    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_power(mut self, power: PowerState) -> Self {
        self.power = Some(power);
        self
    }

    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = Some(brightness.min(100));
        self
    }

    pub fn with_contrast(mut self, contrast: u8) -> Self {
        self.contrast = Some(contrast.min(100));
        self
    }

    /// The fields this update writes, in declaration order.
    pub fn fields(&self) -> Vec<UpdateField> {
        let mut fields = Vec::new();
        if self.mode.is_some() {
            fields.push(UpdateField::Mode);
        }
        if self.orientation.is_some() {
            fields.push(UpdateField::Orientation);
        }
        if self.scale.is_some() {
            fields.push(UpdateField::Scale);
        }
        if self.position.is_some() {
            fields.push(UpdateField::Position);
        }
        if self.primary.is_some() {
            fields.push(UpdateField::Primary);
        }
        if self.power.is_some() {
            fields.push(UpdateField::Power);
        }
        if self.brightness.is_some() {
            fields.push(UpdateField::Brightness);
        }
        if self.contrast.is_some() {
            fields.push(UpdateField::Contrast);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// Capability interface to the platform's display control surface.
///
/// Implementations must be cheap to call repeatedly: the watchdog calls
/// `list_monitors` and `get_state` for every monitor on every tick.
///
/// Fields a platform cannot read are left `None` in the returned
/// [`MonitorState`]; they are never an error.  Writes the platform cannot
/// perform return [`BackendError::Unsupported`].
#[cfg_attr(test, mockall::automock)]
pub trait MonitorBackend: Send + Sync {
    /// Returns the monitors the system currently reports, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the platform cannot be queried at all.
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError>;

    /// Reads the full state of one monitor.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidHandle`] if `handle` is stale.
    fn get_state(&self, handle: &MonitorHandle) -> Result<MonitorState, BackendError>;

    /// Writes the `Some` fields of `update`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unsupported`] for fields the platform cannot
    /// write and [`BackendError::Rejected`] for values it refuses.
    fn set_state(&self, handle: &MonitorHandle, update: &StateUpdate) -> Result<(), BackendError>;

    /// Current pointer position in desktop coordinates, `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the pointer query itself fails.
    fn mouse_position(&self) -> Result<Option<Point>, BackendError>;

    /// Placement rules the arrangement solver must respect on this backend.
    fn rules(&self) -> PlatformRules {
        PlatformRules::current()
    }
}

// ── Linux implementation ──────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
pub mod linux;

/// Re-export the xrandr backend as `NativeBackend` on Linux.
#[cfg(target_os = "linux")]
pub use linux::XrandrBackend as NativeBackend;

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the Win32 backend as `NativeBackend` on Windows.
#[cfg(target_os = "windows")]
pub use windows::Win32Backend as NativeBackend;

// ── macOS implementation ──────────────────────────────────────────────────────

#[cfg(target_os = "macos")]
pub mod macos;

/// Re-export the Core Graphics backend as `NativeBackend` on macOS.
#[cfg(target_os = "macos")]
pub use macos::CoreGraphicsBackend as NativeBackend;

// ── Fallbacks (always compiled) ───────────────────────────────────────────────

pub mod mock;
pub mod unsupported;

pub use mock::{mock_state, MockBackend};
pub use unsupported::UnsupportedBackend;

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
pub use unsupported::UnsupportedBackend as NativeBackend;

/// Builds the backend for the platform this binary was compiled for.
pub fn native_backend() -> Arc<dyn MonitorBackend> {
    Arc::new(NativeBackend::new())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_update_fields_lists_only_set_fields() {
        // Arrange
        let update = StateUpdate::default()
            .with_position(Point::new(10, 20))
            .with_primary(true);

        // Act
        let fields = update.fields();

        // Assert
        assert_eq!(fields, vec![UpdateField::Position, UpdateField::Primary]);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_state_update_default_is_empty() {
        assert!(StateUpdate::default().is_empty());
    }

    #[test]
    fn test_state_update_clamps_brightness_and_contrast() {
        let update = StateUpdate::default().with_brightness(150).with_contrast(101);
        assert_eq!(update.brightness, Some(100));
        assert_eq!(update.contrast, Some(100));
    }

    #[test]
    fn test_monitor_handle_display_includes_name_and_native_id() {
        let handle = MonitorHandle::new("HDMI-1", 3);
        assert_eq!(handle.to_string(), "HDMI-1#3");
    }
}
