//! Linux backend built on the `xrandr` and `xset` command-line tools.
//!
//! Monitor state comes from parsing `xrandr --query`; writes are issued as
//! `xrandr --output <name> ...` invocations.  The pointer position is read
//! directly through Xlib's `XQueryPointer`.
//!
//! # Implementation notes
//!
//! `xrandr --query` lists every output the X server knows about, connected or
//! not.  Only connected outputs are reported as monitors.  A connected output
//! without a geometry (`HDMI-1 connected (normal left ...)`) is switched off.
//! The native id of a monitor is the index of its output in the query, which
//! is stable for the lifetime of the X server.
//!
//! One `xrandr --query` is run per `list_monitors` call and its parse is
//! cached for the `get_state` calls that follow; any write drops the cache.
//!
//! xrandr has one "off" state for both turning an output off and detaching
//! it from the desktop.  The backend remembers which outputs it detached and
//! reports them as [`PowerState::Detached`] while they stay off; turning an
//! output back on (here or elsewhere) clears the mark.

use std::collections::BTreeSet;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use monctl_core::{DisplayMode, MonitorState, Orientation, Point, PowerState, Size};
use tracing::{debug, trace};

use super::{BackendError, MonitorBackend, MonitorHandle, StateUpdate, UpdateField};

/// Linux implementation of [`MonitorBackend`].
pub struct XrandrBackend {
    cache: Mutex<Option<Vec<XrandrOutput>>>,
    depth: OnceLock<Option<u32>>,
    /// Outputs switched off by a detach request.
    detached: Mutex<BTreeSet<String>>,
}

impl XrandrBackend {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
            depth: OnceLock::new(),
            detached: Mutex::new(BTreeSet::new()),
        }
    }

    fn detached(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.detached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, Option<Vec<XrandrOutput>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query(&self) -> Result<Vec<XrandrOutput>, BackendError> {
        let stdout = run("xrandr", &["--query".to_string()])?;
        let mut outputs = parse_query(&stdout);
        let depth = *self.depth.get_or_init(default_depth);
        for output in &mut outputs {
            output.colordepth = depth;
        }
        *self.cache() = Some(outputs.clone());
        Ok(outputs)
    }

    fn cached_or_query(&self) -> Result<Vec<XrandrOutput>, BackendError> {
        if let Some(outputs) = self.cache().as_ref() {
            return Ok(outputs.clone());
        }
        self.query()
    }
}

impl Default for XrandrBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorBackend for XrandrBackend {
    fn list_monitors(&self) -> Result<Vec<MonitorHandle>, BackendError> {
        let outputs = self.query()?;
        Ok(outputs
            .iter()
            .filter(|o| o.connected)
            .map(|o| MonitorHandle::new(o.name.clone(), o.index as u64))
            .collect())
    }

    fn get_state(&self, handle: &MonitorHandle) -> Result<MonitorState, BackendError> {
        let state = self
            .cached_or_query()?
            .iter()
            .find(|o| o.connected && o.name == handle.name && o.index as u64 == handle.native_id)
            .map(XrandrOutput::to_state)
            .ok_or_else(|| BackendError::InvalidHandle(handle.to_string()))?;
        Ok(with_detach_mark(state, &mut self.detached()))
    }

    fn set_state(&self, handle: &MonitorHandle, update: &StateUpdate) -> Result<(), BackendError> {
        let plan = plan_commands(&handle.name, update)?;
        *self.cache() = None;
        for (program, args) in plan {
            debug!(monitor = %handle.name, program, ?args, "applying monitor update");
            run(program, &args)?;
        }
        record_power_change(&mut self.detached(), &handle.name, update.power);
        Ok(())
    }

    fn mouse_position(&self) -> Result<Option<Point>, BackendError> {
        query_pointer()
    }
}

// ── xrandr --query parsing ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct XrandrOutput {
    index: usize,
    name: String,
    connected: bool,
    primary: bool,
    /// `WxH+X+Y` from the output line; absent when the output is off.
    geometry: Option<(Size, Point)>,
    rotation: Orientation,
    /// Physical size in millimetres.
    physical_mm: Option<(u32, u32)>,
    modes: Vec<DisplayMode>,
    current: Option<DisplayMode>,
    preferred: Option<DisplayMode>,
    colordepth: Option<u32>,
}

impl XrandrOutput {
    fn to_state(&self) -> MonitorState {
        let (size, position, power) = match self.geometry {
            Some((size, position)) => (size, position, PowerState::On),
            None => (Size::default(), Point::ORIGIN, PowerState::Off),
        };

        let dpi = self.physical_mm.and_then(|(w_mm, h_mm)| {
            if w_mm == 0 || h_mm == 0 || size.width == 0 {
                return None;
            }
            // xrandr reports the panel's physical size unrotated.
            let (w_mm, h_mm) = if self.rotation.is_portrait() {
                (h_mm, w_mm)
            } else {
                (w_mm, h_mm)
            };
            Some((
                f64::from(size.width) * 25.4 / f64::from(w_mm),
                f64::from(size.height) * 25.4 / f64::from(h_mm),
            ))
        });

        MonitorState {
            system_name: self.name.clone(),
            position,
            size,
            workarea: None,
            mode: self.current,
            all_modes: self.modes.clone(),
            default_mode: self.preferred,
            scale: None,
            dpi,
            orientation: Some(self.rotation),
            colordepth: self.colordepth,
            brightness: None,
            contrast: None,
            is_primary: self.primary,
            power,
        }
        .normalized()
    }
}

/// Reports an output that is off and was detached by us as `Detached`.  An
/// output found on again loses its mark.
fn with_detach_mark(mut state: MonitorState, detached: &mut BTreeSet<String>) -> MonitorState {
    match state.power {
        PowerState::Off if detached.contains(&state.system_name) => state.power = PowerState::Detached,
        PowerState::On => {
            detached.remove(&state.system_name);
        }
        _ => {}
    }
    state
}

fn record_power_change(detached: &mut BTreeSet<String>, name: &str, power: Option<PowerState>) {
    match power {
        Some(PowerState::Detached) => {
            detached.insert(name.to_string());
        }
        Some(PowerState::On) => {
            detached.remove(name);
        }
        _ => {}
    }
}

fn parse_query(text: &str) -> Vec<XrandrOutput> {
    let mut outputs: Vec<XrandrOutput> = Vec::new();

    for line in text.lines() {
        if line.starts_with("Screen ") || line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some(output) = outputs.last_mut() {
                parse_mode_line(line, output);
            }
            continue;
        }
        if let Some(output) = parse_output_line(line, outputs.len()) {
            outputs.push(output);
        }
    }

    trace!(count = outputs.len(), "parsed xrandr outputs");
    outputs
}

/// Parses `NAME connected|disconnected [primary] [WxH+X+Y] [rotation] (...) [Wmm x Hmm]`.
fn parse_output_line(line: &str, index: usize) -> Option<XrandrOutput> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?.to_string();
    let connected = match tokens.next()? {
        "connected" => true,
        "disconnected" | "unknown" => false,
        _ => return None,
    };

    let mut output = XrandrOutput {
        index,
        name,
        connected,
        primary: false,
        geometry: None,
        rotation: Orientation::Normal,
        physical_mm: None,
        modes: Vec::new(),
        current: None,
        preferred: None,
        colordepth: None,
    };

    // Everything after the parenthesised list of supported rotations.
    let (head, tail) = match line.find('(') {
        Some(open) => {
            let close = line[open..].find(')').map_or(line.len(), |c| open + c + 1);
            (&line[..open], &line[close..])
        }
        None => (line, ""),
    };

    for token in head.split_whitespace().skip(2) {
        match token {
            "primary" => output.primary = true,
            "normal" => output.rotation = Orientation::Normal,
            "right" => output.rotation = Orientation::Right,
            "inverted" => output.rotation = Orientation::Inverted,
            "left" => output.rotation = Orientation::Left,
            other => {
                if let Some(geometry) = parse_geometry(other) {
                    output.geometry = Some(geometry);
                }
            }
        }
    }

    let mm: Vec<u32> = tail
        .split_whitespace()
        .filter_map(|t| t.strip_suffix("mm"))
        .filter_map(|t| t.parse().ok())
        .collect();
    if let [w, h] = mm.as_slice() {
        output.physical_mm = Some((*w, *h));
    }

    Some(output)
}

/// Parses `1920x1080+1280+0`.
fn parse_geometry(token: &str) -> Option<(Size, Point)> {
    let (dims, rest) = token.split_once('+')?;
    let (x, y) = rest.split_once('+')?;
    let (w, h) = dims.split_once('x')?;
    Some((
        Size::new(w.parse().ok()?, h.parse().ok()?),
        Point::new(x.parse().ok()?, y.parse().ok()?),
    ))
}

/// Parses `   1920x1080     60.02*+  59.93   50.00 +` into `output`'s modes.
fn parse_mode_line(line: &str, output: &mut XrandrOutput) {
    let mut tokens = line.split_whitespace();
    let Some(dims) = tokens.next() else { return };
    let dims = dims.trim_end_matches('i');
    let Some((w, h)) = dims.split_once('x') else { return };
    let (Ok(width), Ok(height)) = (w.parse::<u32>(), h.parse::<u32>()) else {
        return;
    };

    let mut last: Option<DisplayMode> = None;
    for token in tokens {
        let rate = token.trim_end_matches(['*', '+']);
        let mode = if rate.is_empty() {
            // A lone `+` or `*` flags the rate before it.
            match last {
                Some(m) => m,
                None => continue,
            }
        } else {
            match rate.parse::<f64>() {
                Ok(freq) => {
                    let m = DisplayMode::new(width, height, freq);
                    if !output.modes.contains(&m) {
                        output.modes.push(m);
                    }
                    m
                }
                Err(_) => continue,
            }
        };
        if token.contains('*') {
            output.current = Some(mode);
        }
        if token.contains('+') {
            output.preferred = Some(mode);
        }
        last = Some(mode);
    }
}

// ── Writes ────────────────────────────────────────────────────────────────────

fn rotation_name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Normal => "normal",
        Orientation::Right => "right",
        Orientation::Inverted => "inverted",
        Orientation::Left => "left",
    }
}

/// Translates `update` into the commands that apply it.
fn plan_commands(
    output: &str,
    update: &StateUpdate,
) -> Result<Vec<(&'static str, Vec<String>)>, BackendError> {
    let fields = update.fields();
    if let Some(field) = fields
        .iter()
        .find(|f| matches!(f, UpdateField::Scale | UpdateField::Contrast))
    {
        return Err(BackendError::Unsupported(format!("setting {field} through xrandr")));
    }

    let mut args = vec!["--output".to_string(), output.to_string()];
    let mut extra = Vec::new();

    if let Some(mode) = update.mode {
        args.push("--mode".to_string());
        args.push(format!("{}x{}", mode.width, mode.height));
        args.push("--rate".to_string());
        args.push(format!("{:.2}", mode.frequency));
    }
    if let Some(orientation) = update.orientation {
        args.push("--rotate".to_string());
        args.push(rotation_name(orientation).to_string());
    }
    if let Some(position) = update.position {
        args.push("--pos".to_string());
        args.push(format!("{}x{}", position.x, position.y));
    }
    match update.primary {
        Some(true) => args.push("--primary".to_string()),
        Some(false) => args.push("--noprimary".to_string()),
        None => {}
    }
    match update.power {
        Some(PowerState::On) => args.push("--auto".to_string()),
        Some(PowerState::Off) | Some(PowerState::Detached) => args.push("--off".to_string()),
        Some(PowerState::Suspended) => {
            // DPMS is per X screen, not per output.
            extra.push((
                "xset",
                vec![
                    "dpms".to_string(),
                    "force".to_string(),
                    "suspend".to_string(),
                ],
            ));
        }
        None => {}
    }
    if let Some(brightness) = update.brightness {
        args.push("--brightness".to_string());
        args.push(format!("{:.2}", f64::from(brightness) / 100.0));
    }

    let mut plan = Vec::new();
    if args.len() > 2 {
        plan.push(("xrandr", args));
    }
    plan.extend(extra);
    Ok(plan)
}

fn run(program: &'static str, args: &[String]) -> Result<String, BackendError> {
    let command_line = format!("{program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| BackendError::Command {
            command: command_line.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(BackendError::Command {
            command: command_line,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ── Xlib ──────────────────────────────────────────────────────────────────────

/// RAII wrapper closing the display connection on drop.
struct XDisplay(*mut x11::xlib::Display);

impl XDisplay {
    fn open() -> Option<Self> {
        // SAFETY: a null name makes Xlib use $DISPLAY.  The returned pointer is
        // owned by this wrapper and closed exactly once in Drop.
        let display = unsafe { x11::xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            let display_env = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
            debug!(display = %display_env, "XOpenDisplay failed");
            None
        } else {
            Some(Self(display))
        }
    }
}

impl Drop for XDisplay {
    fn drop(&mut self) {
        // SAFETY: `self.0` is a valid display opened in `open` and not used after this.
        unsafe { x11::xlib::XCloseDisplay(self.0) };
    }
}

fn default_depth() -> Option<u32> {
    let display = XDisplay::open()?;
    // SAFETY: `display.0` is a valid, open display.
    let depth = unsafe {
        let screen = x11::xlib::XDefaultScreen(display.0);
        x11::xlib::XDefaultDepth(display.0, screen)
    };
    u32::try_from(depth).ok()
}

fn query_pointer() -> Result<Option<Point>, BackendError> {
    let Some(display) = XDisplay::open() else {
        return Ok(None);
    };

    let mut root_return: x11::xlib::Window = 0;
    let mut child_return: x11::xlib::Window = 0;
    let (mut root_x, mut root_y, mut win_x, mut win_y) = (0, 0, 0, 0);
    let mut mask: u32 = 0;

    // SAFETY: `display.0` is a valid, open display and every out-pointer
    // refers to a live local of the type Xlib expects.
    let same_screen = unsafe {
        let root = x11::xlib::XDefaultRootWindow(display.0);
        x11::xlib::XQueryPointer(
            display.0,
            root,
            &mut root_return,
            &mut child_return,
            &mut root_x,
            &mut root_y,
            &mut win_x,
            &mut win_y,
            &mut mask,
        )
    };

    if same_screen == 0 {
        return Err(BackendError::Platform(
            "pointer is not on the default screen".to_string(),
        ));
    }
    Ok(Some(Point::new(root_x, root_y)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
