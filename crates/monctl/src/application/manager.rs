//! MonitorManager: the public query, control and listener surface.
//!
//! One manager owns one [`MonitorRegistry`] (behind a mutex shared with the
//! watchdog thread) and one [`ChangeWatchdog`].  Queries refresh the registry
//! synchronously on the caller's thread unless the watchdog is running, in
//! which case they read the registry it keeps current.
//!
//! Queries never fail: when the platform cannot answer, they return `None` or
//! an empty list.  Control operations return [`MonitorError`].
//!
//! # Where query answers come from
//!
//! ```text
//!   watchdog stopped:   caller ──► refresh registry ──► answer
//!   watchdog running:   caller ──────────────────────► answer (cached)
//!                                       ▲
//!               watchdog thread ── refresh every interval
//! ```
//!
//! The watchdog runs while any listener is registered or update-info mode is
//! on.  Starting it takes a baseline refresh before returning, so queries made
//! right after registering a listener already see every attached monitor.
//!
//! # Arranging monitors
//!
//! [`MonitorManager::arrange_monitors`] solves the whole arrangement against
//! the current sizes before writing anything: an invalid arrangement, an
//! unknown monitor or a layout outside the coordinate range leaves the
//! desktop untouched.  [`MonitorManager::place_monitor`] moves one monitor by
//! building such an arrangement from the current positions.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use monctl_core::{
    solve, ArrangementError, ArrangementIssue, ArrangementSpec, Placement, PlatformRules, Point,
    RelativePosition, Size,
};
use tracing::{debug, info, warn};

use crate::application::error::MonitorError;
use crate::application::registry::{Monitor, MonitorRegistry, RefreshResult};
use crate::application::snapshot::{restore, RestoreReport, Setup, SetupRecord};
use crate::application::watchdog::{ChangeEvent, ChangeWatchdog, ListenerId};
use crate::infrastructure::backend::{native_backend, MonitorBackend};
use crate::infrastructure::storage::config::AppConfig;

pub struct MonitorManager {
    backend: Arc<dyn MonitorBackend>,
    registry: Arc<Mutex<MonitorRegistry>>,
    watchdog: ChangeWatchdog,
    rules: PlatformRules,
}

impl MonitorManager {
    /// Creates a manager over `backend` using the backend's placement rules.
    pub fn new(backend: Arc<dyn MonitorBackend>) -> Self {
        let registry = Arc::new(Mutex::new(MonitorRegistry::new(Arc::clone(&backend))));
        Self {
            rules: backend.rules(),
            watchdog: ChangeWatchdog::new(Arc::clone(&registry)),
            registry,
            backend,
        }
    }

    /// Creates a manager over the backend of the current platform.
    pub fn native() -> Self {
        Self::new(native_backend())
    }

    /// Replaces the placement rules used by arrangement operations.
    pub fn with_rules(mut self, rules: PlatformRules) -> Self {
        self.rules = rules;
        self
    }

    /// Creates a manager configured from `config`: watchdog interval,
    /// update-info mode and placement-rule overrides.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if update-info mode is configured and
    /// the watchdog thread cannot be started.
    pub fn from_config(backend: Arc<dyn MonitorBackend>, config: &AppConfig) -> Result<Self, MonitorError> {
        let rules = config.platform.apply(backend.rules());
        let manager = Self::new(backend).with_rules(rules);
        manager.set_watchdog_interval(config.watchdog.interval());
        if config.watchdog.update_info {
            manager.enable_update_info()?;
        }
        Ok(manager)
    }

    pub fn rules(&self) -> PlatformRules {
        self.rules
    }

    pub fn watchdog(&self) -> &ChangeWatchdog {
        &self.watchdog
    }

    // ── Registry access ───────────────────────────────────────────────────────

    fn lock_registry(&self) -> MutexGuard<'_, MonitorRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The registry, refreshed first unless the watchdog keeps it current.
    ///
    /// Lock order is watchdog worker, then registry.
    fn synced(&self) -> MutexGuard<'_, MonitorRegistry> {
        let watched = self.watchdog.is_running();
        let mut registry = self.lock_registry();
        if !watched {
            if let Err(e) = registry.refresh() {
                warn!(error = %e, "monitor refresh failed; serving cached monitors");
            }
        }
        registry
    }

    /// Forces a refresh regardless of the watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Backend`] if enumeration fails.
    pub fn refresh(&self) -> Result<RefreshResult, MonitorError> {
        self.lock_registry().refresh()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Every attached monitor, in enumeration order.
    pub fn all_monitors(&self) -> Vec<Arc<Monitor>> {
        self.synced().monitors()
    }

    pub fn all_monitors_dict(&self) -> BTreeMap<String, Arc<Monitor>> {
        self.all_monitors()
            .into_iter()
            .map(|m| (m.name(), m))
            .collect()
    }

    pub fn monitors_count(&self) -> usize {
        self.all_monitors().len()
    }

    pub fn primary(&self) -> Option<Arc<Monitor>> {
        self.all_monitors().into_iter().find(|m| m.is_primary())
    }

    /// Monitors whose rectangle contains `point` (several when mirrored).
    pub fn find_monitors_at_point(&self, point: Point) -> Vec<Arc<Monitor>> {
        self.all_monitors()
            .into_iter()
            .filter(|m| m.rect().contains(point))
            .collect()
    }

    pub fn find_monitor_with_name(&self, name: &str) -> Option<Arc<Monitor>> {
        self.synced().get(name)
    }

    /// Pointer position in desktop coordinates, `None` if unavailable.
    pub fn mouse_position(&self) -> Option<Point> {
        match self.backend.mouse_position() {
            Ok(position) => position,
            Err(e) => {
                debug!(error = %e, "pointer position unavailable");
                None
            }
        }
    }

    // ── Arrangement ───────────────────────────────────────────────────────────

    fn sizes(monitors: &[Arc<Monitor>]) -> BTreeMap<String, Size> {
        monitors.iter().map(|m| (m.name(), m.size())).collect()
    }

    /// Solves `spec` against the current monitor sizes without changing
    /// anything.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::UnknownMonitor`] if `spec` names a monitor that is not
    ///   attached.
    /// - [`MonitorError::Arrangement`] if the arrangement is invalid or the result
    ///   overlaps where the platform forbids it.
    pub fn solve_arrangement(&self, spec: &ArrangementSpec) -> Result<BTreeMap<String, Point>, MonitorError> {
        let monitors = self.all_monitors();
        let sizes = Self::sizes(&monitors);
        if let Some(unknown) = spec.names().find(|name| !sizes.contains_key(*name)) {
            return Err(MonitorError::UnknownMonitor(unknown.to_string()));
        }
        Ok(solve(spec, &sizes, &self.rules)?)
    }

    /// Solves `spec` and applies it: the root becomes primary, then every
    /// monitor whose position differs is moved.  Monitors not named in `spec`
    /// are left alone.
    ///
    /// The arrangement is fully validated before anything is written.  A backend
    /// failure while applying stops at that monitor.
    ///
    /// # Errors
    ///
    /// As [`MonitorManager::solve_arrangement`], plus the first write error.
    pub fn arrange_monitors(&self, spec: &ArrangementSpec) -> Result<BTreeMap<String, Point>, MonitorError> {
        let positions = self.solve_arrangement(spec)?;
        let monitors = self.all_monitors_dict();
        let lookup = |name: &str| {
            monitors
                .get(name)
                .cloned()
                .ok_or_else(|| MonitorError::UnknownMonitor(name.to_string()))
        };

        if let Some(root) = spec.primary() {
            let root = lookup(root)?;
            if !root.is_primary() {
                root.set_primary()?;
            }
        }

        for (name, position) in &positions {
            let monitor = lookup(name)?;
            if monitor.position() != *position {
                monitor.set_position(*position)?;
            }
        }

        info!(monitors = positions.len(), "arrangement applied");
        Ok(positions)
    }

    /// Moves one monitor relative to another, keeping every other monitor at
    /// its current offset from the primary.
    ///
    /// Placing a monitor as [`RelativePosition::Primary`] makes it primary at
    /// the origin and lines the others up to its right in enumeration order.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::UnknownMonitor`] if `name` is not attached.
    /// - [`MonitorError::UnsupportedOperation`] when asked to move the primary
    ///   monitor (or the only monitor) to a non-primary placement.
    /// - Otherwise as [`MonitorManager::arrange_monitors`].
    pub fn place_monitor(
        &self,
        name: &str,
        placement: impl Into<Placement>,
        relative_to: Option<&str>,
    ) -> Result<BTreeMap<String, Point>, MonitorError> {
        let placement = placement.into();
        let monitors = self.all_monitors();
        let target = monitors
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| MonitorError::UnknownMonitor(name.to_string()))?;
        let others: Vec<&Arc<Monitor>> = monitors.iter().filter(|m| m.name() != name).collect();

        let spec = if placement.is_primary() {
            let mut spec = ArrangementSpec::new().with(name, RelativePosition::Primary, None);
            let mut previous = name.to_string();
            for monitor in others {
                let current = monitor.name();
                spec.insert(current.clone(), RelativePosition::RightTop, Some(&previous));
                previous = current;
            }
            spec
        } else {
            let unsupported = |reason: &str| MonitorError::UnsupportedOperation {
                monitor: name.to_string(),
                operation: "place_monitor".to_string(),
                reason: reason.to_string(),
            };
            if target.is_primary() {
                return Err(unsupported("the primary monitor can only be placed as PRIMARY"));
            }
            let anchor = others
                .iter()
                .find(|m| m.is_primary())
                .or_else(|| others.first())
                .ok_or_else(|| unsupported("no other monitor to place it against"))?;
            let positions: BTreeMap<String, Point> =
                others.iter().map(|m| (m.name(), m.position())).collect();
            let anchor = anchor.name();
            // `anchor` is in `positions`, so `None` means an offset overflowed.
            let mut spec = ArrangementSpec::from_positions(&positions, &anchor).ok_or_else(|| {
                ArrangementError::InvalidArrangement(vec![ArrangementIssue::OutOfRange(anchor.clone())])
            })?;
            spec.insert(name, placement, relative_to);
            spec
        };

        self.arrange_monitors(&spec)
    }

    // ── Setups ────────────────────────────────────────────────────────────────

    /// Captures every attached monitor, primary first.
    pub fn save_setup(&self) -> Setup {
        Setup::capture(&self.all_monitors())
    }

    /// Restores `setup` field by field.  Never stops early; inspect the report
    /// or call [`RestoreReport::into_result`].
    pub fn restore_setup(&self, setup: &Setup) -> RestoreReport {
        drop(self.synced());
        let report = restore(setup, |name| self.lock_registry().get(name));
        info!(
            fields = report.results.len(),
            failed = report.failures().count(),
            "setup restored"
        );
        report
    }

    /// Restores a setup loaded from disk, resolving monitors by name.
    pub fn restore_setup_record(&self, record: SetupRecord) -> RestoreReport {
        self.restore_setup(&Setup::from_record(record))
    }

    // ── Listeners and watchdog ────────────────────────────────────────────────

    /// See [`ChangeWatchdog::register_plug_listener`].
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the watchdog cannot be started.
    pub fn register_plug_listener(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, MonitorError> {
        self.watchdog.register_plug_listener(listener)
    }

    /// See [`ChangeWatchdog::register_change_listener`].
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the watchdog cannot be started.
    pub fn register_change_listener(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, MonitorError> {
        self.watchdog.register_change_listener(listener)
    }

    pub fn unregister_plug_listener(&self, id: ListenerId) -> bool {
        self.watchdog.unregister_plug_listener(id)
    }

    pub fn unregister_change_listener(&self, id: ListenerId) -> bool {
        self.watchdog.unregister_change_listener(id)
    }

    pub fn is_plug_listener_registered(&self, id: ListenerId) -> bool {
        self.watchdog.is_plug_listener_registered(id)
    }

    pub fn is_change_listener_registered(&self, id: ListenerId) -> bool {
        self.watchdog.is_change_listener_registered(id)
    }

    pub fn is_watchdog_enabled(&self) -> bool {
        self.watchdog.is_running()
    }

    pub fn set_watchdog_interval(&self, interval: Duration) {
        self.watchdog.set_interval(interval);
    }

    /// Keeps the watchdog running so queries read its cache instead of
    /// querying the backend each time.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the watchdog cannot be started.
    pub fn enable_update_info(&self) -> Result<(), MonitorError> {
        self.watchdog.enable_update_info()
    }

    pub fn disable_update_info(&self) -> Result<(), MonitorError> {
        self.watchdog.disable_update_info()
    }

    pub fn is_update_info_enabled(&self) -> bool {
        self.watchdog.is_update_info_enabled()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
