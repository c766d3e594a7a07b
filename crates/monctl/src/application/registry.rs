//! MonitorRegistry: the authoritative set of live [`Monitor`] objects.
//!
//! The registry owns one `Arc<Monitor>` per monitor the process knows about
//! and reconciles it against the backend on every [`MonitorRegistry::refresh`].
//! A `Monitor` is never replaced: refresh overwrites its state in place, so any
//! `Arc<Monitor>` a caller holds keeps seeing live values.
//!
//! # Matching
//!
//! Backend handles are matched to existing monitors by name.  When a name is
//! new, the registry checks whether an existing monitor that is no longer
//! reported has exactly the same geometry and mode; if exactly one does, the
//! platform re-enumerated it under a new name and the object is renamed rather
//! than replaced.  A matched monitor whose native id changed is re-bound.
//!
//! # Grace cycle
//!
//! A monitor missing from one refresh is marked stale but kept.  If it comes
//! back on the next refresh it is revived (reported as `reattached`); if it is
//! still missing, it is evicted, its power state set to
//! [`PowerState::Detached`], and reported as `removed`.
//!
//! ```text
//!            reported                 missing                 missing
//!   (new) ──────────────►  live  ─────────────►  stale  ─────────────►  evicted
//!                           ▲                      │
//!                           └──── reported again ──┘   (reattached)
//! ```
//!
//! # Stale monitors
//!
//! Setters on a stale monitor return [`MonitorError::InvalidHandle`] without
//! touching the backend; getters keep returning the last known values.  A
//! write the backend rejects because the handle was recycled also returns
//! `InvalidHandle`; the next refresh re-binds or evicts the monitor.
//!
//! # Threading
//!
//! `Monitor` is `Send + Sync`: its fields sit behind `RwLock`s so callers may
//! read it while the watchdog thread refreshes the registry.  `refresh` itself
//! takes `&mut self`; the manager serialises it behind a mutex.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use monctl_core::{
    Bounds, DisplayMode, Dpi, MonitorState, Orientation, Point, PowerState, Rect, Scale, Size,
};
use tracing::{debug, warn};

use crate::application::error::MonitorError;
use crate::infrastructure::backend::{MonitorBackend, MonitorHandle, StateUpdate};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// One physical or logical display.
///
/// Obtained from [`MonitorRegistry`] (usually through `MonitorManager`) and
/// shared as `Arc<Monitor>`.  Getters return the state captured by the last
/// refresh; setters write through the backend and re-read the state.
pub struct Monitor {
    name: RwLock<String>,
    handle: RwLock<MonitorHandle>,
    state: RwLock<MonitorState>,
    stale: AtomicBool,
    backend: Arc<dyn MonitorBackend>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("name", &*read(&self.name))
            .field("handle", &*read(&self.handle))
            .field("stale", &self.is_stale())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    fn new(handle: MonitorHandle, state: MonitorState, backend: Arc<dyn MonitorBackend>) -> Self {
        Self {
            name: RwLock::new(handle.name.clone()),
            handle: RwLock::new(handle),
            state: RwLock::new(state),
            stale: AtomicBool::new(false),
            backend,
        }
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    pub fn handle(&self) -> MonitorHandle {
        read(&self.handle).clone()
    }

    /// `false` once the backend stopped reporting this monitor.
    pub fn is_valid(&self) -> bool {
        !self.is_stale()
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    // ── Getters ───────────────────────────────────────────────────────────────

    /// Full state snapshot.
    pub fn state(&self) -> MonitorState {
        read(&self.state).clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&MonitorState) -> T) -> T {
        f(&read(&self.state))
    }

    pub fn system_name(&self) -> String {
        self.with_state(|s| s.system_name.clone())
    }

    pub fn position(&self) -> Point {
        self.with_state(|s| s.position)
    }

    pub fn size(&self) -> Size {
        self.with_state(|s| s.size)
    }

    pub fn rect(&self) -> Rect {
        self.with_state(MonitorState::rect)
    }

    /// `(left, top, width, height)` view of [`Monitor::rect`].
    pub fn bounds(&self) -> Bounds {
        Bounds::from(self.rect())
    }

    pub fn workarea(&self) -> Option<Rect> {
        self.with_state(|s| s.workarea)
    }

    pub fn mode(&self) -> Option<DisplayMode> {
        self.with_state(|s| s.mode)
    }

    pub fn all_modes(&self) -> Vec<DisplayMode> {
        self.with_state(|s| s.all_modes.clone())
    }

    pub fn default_mode(&self) -> Option<DisplayMode> {
        self.with_state(|s| s.default_mode)
    }

    pub fn frequency(&self) -> Option<f64> {
        self.with_state(MonitorState::frequency)
    }

    pub fn colordepth(&self) -> Option<u32> {
        self.with_state(|s| s.colordepth)
    }

    pub fn scale(&self) -> Option<Scale> {
        self.with_state(|s| s.scale)
    }

    pub fn dpi(&self) -> Option<Dpi> {
        self.with_state(|s| s.dpi)
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.with_state(|s| s.orientation)
    }

    pub fn brightness(&self) -> Option<u8> {
        self.with_state(|s| s.brightness)
    }

    pub fn contrast(&self) -> Option<u8> {
        self.with_state(|s| s.contrast)
    }

    pub fn is_primary(&self) -> bool {
        self.with_state(|s| s.is_primary)
    }

    pub fn power(&self) -> PowerState {
        self.with_state(|s| s.power)
    }

    pub fn is_on(&self) -> bool {
        self.power() == PowerState::On
    }

    pub fn is_attached(&self) -> bool {
        self.power() != PowerState::Detached
    }

    // ── Setters ───────────────────────────────────────────────────────────────

    /// Writes `update` through the backend, then re-reads this monitor.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::InvalidHandle`] if the monitor is stale.
    /// - [`MonitorError::UnsupportedOperation`] if the backend cannot write a
    ///   field of `update`.
    /// - [`MonitorError::Backend`] for any other backend failure.
    pub fn apply(&self, operation: &str, update: &StateUpdate) -> Result<(), MonitorError> {
        let name = self.name();
        if self.is_stale() {
            return Err(MonitorError::InvalidHandle(name));
        }
        let handle = self.handle();
        debug!(monitor = %name, operation, fields = ?update.fields(), "writing monitor state");
        self.backend
            .set_state(&handle, update)
            .map_err(|e| MonitorError::from_backend(&name, operation, e))?;
        self.reload();
        Ok(())
    }

    fn reload(&self) {
        let handle = self.handle();
        match self.backend.get_state(&handle) {
            Ok(state) => *write(&self.state) = state.normalized(),
            Err(e) => debug!(monitor = %handle.name, error = %e, "re-reading state after write failed"),
        }
    }

    /// Switches to `mode`, which must be one of [`Monitor::all_modes`].
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::ModeNotAvailable`] for modes outside the list,
    /// otherwise as [`Monitor::apply`].
    pub fn set_mode(&self, mode: DisplayMode) -> Result<(), MonitorError> {
        if !self.with_state(|s| s.all_modes.contains(&mode)) {
            return Err(MonitorError::ModeNotAvailable {
                monitor: self.name(),
                mode,
            });
        }
        self.apply("set_mode", &StateUpdate::default().with_mode(mode))
    }

    /// Switches back to the monitor's preferred mode.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::UnsupportedOperation`] if the platform does not
    /// report a default mode, otherwise as [`Monitor::set_mode`].
    pub fn set_default_mode(&self) -> Result<(), MonitorError> {
        match self.default_mode() {
            Some(mode) => self.set_mode(mode),
            None => Err(MonitorError::UnsupportedOperation {
                monitor: self.name(),
                operation: "set_default_mode".to_string(),
                reason: "default mode is unknown".to_string(),
            }),
        }
    }

    pub fn set_orientation(&self, orientation: Orientation) -> Result<(), MonitorError> {
        self.apply(
            "set_orientation",
            &StateUpdate::default().with_orientation(orientation),
        )
    }

    pub fn set_scale(&self, scale: Scale) -> Result<(), MonitorError> {
        self.apply("set_scale", &StateUpdate::default().with_scale(scale))
    }

    /// Moves the monitor to an absolute desktop position.  No arrangement rules
    /// are checked; use `MonitorManager::place_monitor` for that.
    pub fn set_position(&self, position: Point) -> Result<(), MonitorError> {
        self.apply("set_position", &StateUpdate::default().with_position(position))
    }

    pub fn set_primary(&self) -> Result<(), MonitorError> {
        self.apply("set_primary", &StateUpdate::default().with_primary(true))
    }

    pub fn set_brightness(&self, brightness: u8) -> Result<(), MonitorError> {
        self.apply("set_brightness", &StateUpdate::default().with_brightness(brightness))
    }

    pub fn set_contrast(&self, contrast: u8) -> Result<(), MonitorError> {
        self.apply("set_contrast", &StateUpdate::default().with_contrast(contrast))
    }

    pub fn turn_on(&self) -> Result<(), MonitorError> {
        self.apply("turn_on", &StateUpdate::default().with_power(PowerState::On))
    }

    pub fn turn_off(&self) -> Result<(), MonitorError> {
        self.apply("turn_off", &StateUpdate::default().with_power(PowerState::Off))
    }

    pub fn suspend(&self) -> Result<(), MonitorError> {
        self.apply("suspend", &StateUpdate::default().with_power(PowerState::Suspended))
    }

    pub fn attach(&self) -> Result<(), MonitorError> {
        self.apply("attach", &StateUpdate::default().with_power(PowerState::On))
    }

    pub fn detach(&self) -> Result<(), MonitorError> {
        self.apply("detach", &StateUpdate::default().with_power(PowerState::Detached))
    }
}

// ── MonitorRegistry ───────────────────────────────────────────────────────────

/// What one [`MonitorRegistry::refresh`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshResult {
    /// Monitors seen for the first time.
    pub added: Vec<String>,
    /// Monitors evicted after missing two refreshes in a row.
    pub removed: Vec<String>,
    /// Monitors whose compared properties changed.
    pub changed: Vec<String>,
    /// Monitors missing for the first time (kept, marked stale).
    pub missing: Vec<String>,
    /// Stale monitors that came back.
    pub reattached: Vec<String>,
    /// `(old, new)` names of monitors recognised under a new name.
    pub renamed: Vec<(String, String)>,
}

impl RefreshResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.missing.is_empty()
            && self.reattached.is_empty()
            && self.renamed.is_empty()
    }
}

/// Authoritative in-process set of monitors.
///
/// Not internally synchronised: callers that refresh from more than one thread
/// wrap the registry in a mutex (as `MonitorManager` does).
pub struct MonitorRegistry {
    backend: Arc<dyn MonitorBackend>,
    /// Enumeration order; stale monitors follow the active ones.
    monitors: Vec<Arc<Monitor>>,
}

impl MonitorRegistry {
    /// Creates an empty registry.  Nothing is known until the first refresh.
    pub fn new(backend: Arc<dyn MonitorBackend>) -> Self {
        Self {
            backend,
            monitors: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn MonitorBackend> {
        &self.backend
    }

    /// Reconciles the registry with the backend.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Backend`] if the backend cannot enumerate
    /// monitors.  The registry is left unchanged in that case.  A failure to
    /// read one monitor's state keeps that monitor's previous state.
    pub fn refresh(&mut self) -> Result<RefreshResult, MonitorError> {
        let handles = self.backend.list_monitors()?;
        let reported: HashSet<String> = handles.iter().map(|h| h.name.clone()).collect();

        let mut result = RefreshResult::default();
        let mut previous: Vec<Option<Arc<Monitor>>> =
            std::mem::take(&mut self.monitors).into_iter().map(Some).collect();
        let mut next: Vec<Arc<Monitor>> = Vec::with_capacity(handles.len());

        for handle in handles {
            let by_name = previous
                .iter()
                .position(|m| m.as_ref().is_some_and(|m| *read(&m.name) == handle.name));

            if let Some(monitor) = by_name.and_then(|idx| previous[idx].take()) {
                self.update_existing(&monitor, handle, &mut result);
                next.push(monitor);
                continue;
            }

            let state = match self.backend.get_state(&handle) {
                Ok(state) => state.normalized(),
                Err(e) => {
                    warn!(monitor = %handle.name, error = %e, "skipping monitor whose state cannot be read");
                    continue;
                }
            };

            let by_geometry: Vec<usize> = previous
                .iter()
                .enumerate()
                .filter(|(_, m)| {
                    m.as_ref().is_some_and(|m| {
                        !reported.contains(&*read(&m.name)) && read(&m.state).same_geometry(&state)
                    })
                })
                .map(|(idx, _)| idx)
                .collect();

            if let [idx] = by_geometry.as_slice() {
                if let Some(monitor) = previous[*idx].take() {
                    let old_name = monitor.name();
                    debug!(old = %old_name, new = %handle.name, "monitor re-enumerated under a new name");
                    if monitor.stale.swap(false, Ordering::AcqRel) {
                        result.reattached.push(handle.name.clone());
                    }
                    *write(&monitor.name) = handle.name.clone();
                    result.renamed.push((old_name, handle.name.clone()));
                    *write(&monitor.handle) = handle;
                    *write(&monitor.state) = state;
                    next.push(monitor);
                    continue;
                }
            }

            debug!(monitor = %handle.name, "new monitor");
            result.added.push(handle.name.clone());
            next.push(Arc::new(Monitor::new(handle, state, Arc::clone(&self.backend))));
        }

        for monitor in previous.into_iter().flatten() {
            let name = monitor.name();
            if monitor.stale.swap(true, Ordering::AcqRel) {
                debug!(monitor = %name, "evicting monitor missing for two refreshes");
                write(&monitor.state).power = PowerState::Detached;
                result.removed.push(name);
            } else {
                debug!(monitor = %name, "monitor missing; keeping it for one refresh");
                result.missing.push(name);
                next.push(monitor);
            }
        }

        // Active monitors first, in enumeration order.
        next.sort_by_key(|m| m.is_stale());
        self.monitors = next;
        Ok(result)
    }

    fn update_existing(&self, monitor: &Arc<Monitor>, handle: MonitorHandle, result: &mut RefreshResult) {
        let name = handle.name.clone();

        if monitor.stale.swap(false, Ordering::AcqRel) {
            debug!(monitor = %name, "monitor reappeared within its grace refresh");
            result.reattached.push(name.clone());
        }

        {
            let mut current = write(&monitor.handle);
            if current.native_id != handle.native_id {
                debug!(
                    monitor = %name,
                    old = current.native_id,
                    new = handle.native_id,
                    "re-binding recycled native handle"
                );
                *current = handle.clone();
            }
        }

        match self.backend.get_state(&handle) {
            Ok(state) => {
                let state = state.normalized();
                let mut current = write(&monitor.state);
                if !current.changed_fields(&state).is_empty() {
                    result.changed.push(name);
                }
                *current = state;
            }
            Err(e) => warn!(monitor = %name, error = %e, "keeping previous state; read failed"),
        }
    }

    /// Active monitors, in enumeration order.
    pub fn monitors(&self) -> Vec<Arc<Monitor>> {
        self.monitors.iter().filter(|m| !m.is_stale()).cloned().collect()
    }

    /// Every monitor the registry still holds, stale ones included.
    pub fn all_known(&self) -> Vec<Arc<Monitor>> {
        self.monitors.clone()
    }

    /// Active monitor named `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Monitor>> {
        self.monitors
            .iter()
            .find(|m| !m.is_stale() && *read(&m.name) == name)
            .cloned()
    }

    /// State of every active monitor, keyed by name.
    pub fn states(&self) -> BTreeMap<String, MonitorState> {
        self.monitors
            .iter()
            .filter(|m| !m.is_stale())
            .map(|m| (m.name(), m.state()))
            .collect()
    }

    /// State of every monitor the registry holds, stale ones included.  Used
    /// for diffing so that a one-refresh flap does not look like an unplug.
    pub fn known_states(&self) -> BTreeMap<String, MonitorState> {
        self.monitors.iter().map(|m| (m.name(), m.state())).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
