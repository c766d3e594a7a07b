//! Windows backend via `EnumDisplayMonitors` / `GetMonitorInfoW`.
//!
//! Monitor geometry and work area come from `GetMonitorInfoW`; the current
//! mode, orientation and mode list from `EnumDisplaySettingsW`.  The native id
//! is the `HMONITOR` value, which Windows recycles when monitors are attached
//! or detached, so the registry re-binds it by name on every refresh.
//!
//! Display configuration changes are not implemented here: every write returns
//! [`BackendError::Unsupported`].

use monctl_core::{DisplayMode, MonitorState, Orientation, Point, Rect, Size};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOL, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, EnumDisplaySettingsW, GetMonitorInfoW, DEVMODEW,
    ENUM_CURRENT_SETTINGS, ENUM_DISPLAY_SETTINGS_MODE, HDC, HMONITOR, MONITORINFO,
    MONITORINFOEXW,
};
use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

use super::{BackendError, MonitorBackend, MonitorHandle, StateUpdate};

const MONITORINFOF_PRIMARY: u32 = 1;

/// Windows implementation of [`MonitorBackend`] using Win32 APIs.
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Win32Backend {
    fn default() -> Self {
        Self::new()
    }
}

struct RawMonitor {
    native_id: u64,
    info: MONITORINFOEXW,
}

impl RawMonitor {
    fn device_name(&self) -> String {
        let wide = &self.info.szDevice;
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }
}

fn enumerate() -> Result<Vec<RawMonitor>, BackendError> {
    let mut monitors: Vec<RawMonitor> = Vec::new();

    // SAFETY: `lpfn` is a valid function pointer with the correct signature.
    // `lParam` is a raw pointer to `monitors` which outlives this call.
    // The callback is synchronous and called only within `EnumDisplayMonitors`.
    // `HDC::default()` (null) means enumerate all monitors on the virtual desktop.
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(monitor_enum_proc),
            LPARAM(&mut monitors as *mut Vec<RawMonitor> as isize),
        )
    };

    if !ok.as_bool() {
        return Err(BackendError::Platform(
            "EnumDisplayMonitors failed".to_string(),
        ));
    }
    Ok(monitors)
}

/// Win32 monitor enumeration callback.
///
/// # Safety
///
/// Called by Win32 inside `EnumDisplayMonitors`. `lparam` must be a valid
/// pointer to `Vec<RawMonitor>` for the duration of the enumeration call.
unsafe extern "system" fn monitor_enum_proc(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _lprc_clip: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<RawMonitor>);

    // SAFETY: MONITORINFOEXW is a Plain Old Data struct; zero initialization is valid.
    let mut info: MONITORINFOEXW = std::mem::zeroed();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

    // SAFETY: `hmonitor` is a valid handle provided by Win32, and `cbSize`
    // tells GetMonitorInfoW it may fill the extended structure.
    if GetMonitorInfoW(hmonitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO).as_bool() {
        monitors.push(RawMonitor {
            native_id: hmonitor.0 as usize as u64,
            info,
        });
    }

    BOOL(1) // continue enumeration
}

fn rect_from_win32(rc: &RECT) -> Rect {
    Rect {
        left: rc.left,
        top: rc.top,
        right: rc.right,
        bottom: rc.bottom,
    }
}

fn devmode_to_mode(dm: &DEVMODEW) -> DisplayMode {
    DisplayMode::new(dm.dmPelsWidth, dm.dmPelsHeight, f64::from(dm.dmDisplayFrequency))
}

/// Reads the current settings and every supported mode of a display device.
fn display_settings(device: &[u16]) -> (Option<DEVMODEW>, Vec<DisplayMode>) {
    let name = PCWSTR(device.as_ptr());

    // SAFETY: DEVMODEW is Plain Old Data; `dmSize` is set before each call and
    // `name` points at the NUL-terminated device name owned by the caller.
    unsafe {
        let mut current: DEVMODEW = std::mem::zeroed();
        current.dmSize = std::mem::size_of::<DEVMODEW>() as u16;
        let current = EnumDisplaySettingsW(name, ENUM_CURRENT_SETTINGS, &mut current)
            .as_bool()
            .then_some(current);

        let mut modes = Vec::new();
        let mut index = 0u32;
        loop {
            let mut dm: DEVMODEW = std::mem::zeroed();
            dm.dmSize = std::mem::size_of::<DEVMODEW>() as u16;
            if !EnumDisplaySettingsW(name, ENUM_DISPLAY_SETTINGS_MODE(index), &mut dm).as_bool() {
                break;
            }
            let mode = devmode_to_mode(&dm);
            if !modes.contains(&mode) {
                modes.push(mode);
            }
            index += 1;
        }

        (current, modes)
    }
}

impl MonitorBackend for Win32Backend {
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError> {
        Ok(enumerate()?
            .iter()
            .map(|m| MonitorHandle::new(m.device_name(), m.native_id))
            .collect())
    }

    fn get_state(&self, handle: &MonitorHandle) -> Result<MonitorState, BackendError> {
        let monitors = enumerate()?;
        let raw = monitors
            .iter()
            .find(|m| m.native_id == handle.native_id && m.device_name() == handle.name)
            .ok_or_else(|| BackendError::InvalidHandle(handle.to_string()))?;

        let info = &raw.info.monitorInfo;
        let rect = rect_from_win32(&info.rcMonitor);
        let (current, all_modes) = display_settings(&raw.info.szDevice);

        let (mode, orientation, colordepth) = match current {
            Some(dm) => {
                // SAFETY: display devices fill the display-specific arm of the union.
                let orientation = unsafe { dm.Anonymous1.Anonymous2.dmDisplayOrientation.0 };
                (
                    Some(devmode_to_mode(&dm)),
                    Orientation::from_index(orientation as u8),
                    Some(dm.dmBitsPerPel),
                )
            }
            None => (None, None, None),
        };

        Ok(MonitorState {
            system_name: raw.device_name(),
            position: rect.origin(),
            size: Size::new(rect.width(), rect.height()),
            workarea: Some(rect_from_win32(&info.rcWork)),
            mode,
            all_modes,
            default_mode: None,
            scale: None,
            dpi: None,
            orientation,
            colordepth,
            brightness: None,
            contrast: None,
            is_primary: info.dwFlags & MONITORINFOF_PRIMARY != 0,
            ..MonitorState::default()
        }
        .normalized())
    }

    fn set_state(&self, _handle: &MonitorHandle, update: &StateUpdate) -> Result<(), BackendError> {
        let fields: Vec<String> = update.fields().iter().map(ToString::to_string).collect();
        Err(BackendError::Unsupported(format!(
            "changing {} on Windows",
            fields.join(", ")
        )))
    }

    fn mouse_position(&self) -> Result<Option<Point>, BackendError> {
        let mut pt = POINT::default();
        // SAFETY: `pt` is a valid, writable POINT.
        unsafe { GetCursorPos(&mut pt) }.map_err(|e| BackendError::Platform(e.to_string()))?;
        Ok(Some(Point::new(pt.x, pt.y)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Smoke-tests enumeration on the test machine.  The actual count depends
    /// on the display configuration so only a minimum of one is asserted.
    #[test]
    fn test_win32_backend_lists_at_least_one_monitor() {
        let backend = Win32Backend::new();
        let result = backend.list_monitors();
        assert!(result.is_ok(), "list_monitors must succeed: {:?}", result.err());
        assert!(!result.unwrap_or_default().is_empty(), "must find at least one monitor");
    }

    #[test]
    fn test_win32_backend_reports_exactly_one_primary() {
        let backend = Win32Backend::new();
        let handles = backend.list_monitors().expect("list");
        let primaries = handles
            .iter()
            .filter_map(|h| backend.get_state(h).ok())
            .filter(|s| s.is_primary)
            .count();
        assert_eq!(primaries, 1);
    }

    #[test]
    fn test_win32_backend_writes_are_unsupported() {
        let backend = Win32Backend::new();
        let handle = MonitorHandle::new("\\\\.\\DISPLAY1", 0);
        let result = backend.set_state(&handle, &StateUpdate::default().with_primary(true));
        assert!(matches!(result, Err(BackendError::Unsupported(_))));
    }
}
