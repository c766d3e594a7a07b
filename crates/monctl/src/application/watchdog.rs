//! ChangeWatchdog: background polling loop that turns registry refreshes into
//! plug and property-change events.
//!
//! # Lifecycle
//!
//! ```text
//! STOPPED ──start()──▶ RUNNING ──stop()──▶ STOPPED
//!                        │
//!                        └─ per tick: wait ▶ refresh ▶ diff ▶ dispatch
//! ```
//!
//! The watchdog runs while it has a reason to: a plug listener, a change
//! listener, or update-info mode.  Registering the first listener starts it;
//! removing the last reason stops it.  [`ChangeWatchdog::start`] and
//! [`ChangeWatchdog::stop`] are also public for callers that drive it directly.
//!
//! # Dispatch contract
//!
//! Listeners run synchronously on the watchdog thread.  A slow listener delays
//! the next tick; listeners should hand work off rather than block.  Listeners
//! may register or unregister listeners (including themselves) while being
//! called.  A panicking listener is logged and the loop keeps running.
//!
//! Starting takes the baseline snapshot on the caller's thread, so the
//! registry is populated when `start` (or the registration that triggered it)
//! returns, and the first tick diffs against that baseline.
//!
//! Interval changes take effect at the next tick boundary.  `stop()` does not
//! interrupt an in-progress backend call.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use monctl_core::MonitorState;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::MonitorError;
use crate::application::registry::MonitorRegistry;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The set of monitor names changed.
    PlugCountChanged,
    /// One or more monitors present on both ticks changed properties.
    PropertyChanged,
}

/// One settled transition, shared by every listener it is dispatched to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Affected monitor names, sorted, each listed once.
    pub names: Vec<String>,
    pub kind: ChangeKind,
    /// State of every attached monitor after the transition.
    pub snapshot: Arc<BTreeMap<String, MonitorState>>,
}

/// Token returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked with each event of the kind it was registered for.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Names that changed between two ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TickDiff {
    pub plugged: Vec<String>,
    pub changed: Vec<String>,
}

/// Compares two snapshots of the registry's known monitors.
///
/// `reattached` names monitors that dropped out for a single refresh and came
/// back: they sit in both snapshots but still count as a plug change.  A
/// monitor counted as a plug change is never also reported as changed.
pub(crate) fn diff_snapshots(
    previous: &BTreeMap<String, MonitorState>,
    next: &BTreeMap<String, MonitorState>,
    reattached: &[String],
) -> TickDiff {
    let mut plugged: Vec<String> = previous
        .keys()
        .filter(|name| !next.contains_key(*name))
        .chain(next.keys().filter(|name| !previous.contains_key(*name)))
        .chain(reattached.iter())
        .cloned()
        .collect();
    plugged.sort();
    plugged.dedup();

    let changed = next
        .iter()
        .filter(|(name, _)| plugged.binary_search(*name).is_err())
        .filter(|(name, state)| {
            previous
                .get(*name)
                .is_some_and(|before| !before.changed_fields(state).is_empty())
        })
        .map(|(name, _)| name.clone())
        .collect();

    TickDiff { plugged, changed }
}

// ── Shared state ──────────────────────────────────────────────────────────────

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Listeners {
    plug: RwLock<Vec<(ListenerId, Listener)>>,
    change: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    fn list(&self, kind: ChangeKind) -> &RwLock<Vec<(ListenerId, Listener)>> {
        match kind {
            ChangeKind::PlugCountChanged => &self.plug,
            ChangeKind::PropertyChanged => &self.change,
        }
    }

    fn snapshot(&self, kind: ChangeKind) -> Vec<Listener> {
        self.list(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    fn is_empty(&self) -> bool {
        [ChangeKind::PlugCountChanged, ChangeKind::PropertyChanged]
            .iter()
            .all(|k| self.list(*k).read().unwrap_or_else(PoisonError::into_inner).is_empty())
    }
}

struct Shared {
    registry: Arc<Mutex<MonitorRegistry>>,
    listeners: Listeners,
    interval: Mutex<Duration>,
}

/// Per-thread tick state: the snapshot the next refresh is diffed against.
struct Ticker {
    previous: BTreeMap<String, MonitorState>,
}

impl Ticker {
    /// Refreshes once to take the baseline snapshot.
    fn new(shared: &Shared) -> Self {
        let mut registry = lock(&shared.registry);
        if let Err(e) = registry.refresh() {
            warn!(error = %e, "baseline refresh failed; starting from the cached registry");
        }
        Self {
            previous: registry.known_states(),
        }
    }

    /// One refresh/diff cycle.  Returns the events to dispatch (plug first).
    fn tick(&mut self, shared: &Shared) -> Vec<ChangeEvent> {
        let (result, next, attached) = {
            let mut registry = lock(&shared.registry);
            match registry.refresh() {
                Ok(result) => (result, registry.known_states(), registry.states()),
                Err(e) => {
                    warn!(error = %e, "watchdog refresh failed; retrying next tick");
                    return Vec::new();
                }
            }
        };

        let diff = diff_snapshots(&self.previous, &next, &result.reattached);
        self.previous = next;

        let snapshot = Arc::new(attached);
        let mut events = Vec::new();
        if !diff.plugged.is_empty() {
            events.push(ChangeEvent {
                names: diff.plugged,
                kind: ChangeKind::PlugCountChanged,
                snapshot: Arc::clone(&snapshot),
            });
        }
        if !diff.changed.is_empty() {
            events.push(ChangeEvent {
                names: diff.changed,
                kind: ChangeKind::PropertyChanged,
                snapshot,
            });
        }
        events
    }
}

fn dispatch(shared: &Shared, event: &ChangeEvent) {
    debug!(kind = ?event.kind, names = ?event.names, "dispatching monitor event");
    for listener in shared.listeners.snapshot(event.kind) {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            error!(kind = ?event.kind, "monitor listener panicked");
        }
    }
}

/// The interval is read once per tick boundary; a wait already in progress
/// keeps the value it started with.
fn run(shared: Arc<Shared>, mut ticker: Ticker, first_wait: Duration, stop_rx: mpsc::Receiver<()>) {
    let mut interval = first_wait;
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        for event in ticker.tick(&shared) {
            dispatch(&shared, &event);
        }
        interval = *lock(&shared.interval);
    }
    debug!("watchdog loop exited");
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Signals the thread and waits for it, unless called from the watchdog
    /// thread itself (i.e. from a listener), in which case the thread exits
    /// after the current dispatch.
    fn finish(self) {
        // A send error means the thread already exited.
        let _ = self.stop_tx.send(());
        if self.thread.thread().id() == thread::current().id() {
            info!("monitor watchdog stopping from its own thread");
            return;
        }
        if self.thread.join().is_err() {
            error!("monitor watchdog thread panicked");
        }
        info!("monitor watchdog stopped");
    }
}

// ── ChangeWatchdog ────────────────────────────────────────────────────────────

/// Polls a [`MonitorRegistry`] on a background thread and dispatches
/// [`ChangeEvent`]s to registered listeners.
pub struct ChangeWatchdog {
    shared: Arc<Shared>,
    update_info: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

impl ChangeWatchdog {
    pub fn new(registry: Arc<Mutex<MonitorRegistry>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                listeners: Listeners {
                    plug: RwLock::new(Vec::new()),
                    change: RwLock::new(Vec::new()),
                },
                interval: Mutex::new(DEFAULT_INTERVAL),
            }),
            update_info: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts the polling thread.  No-op if already running.
    ///
    /// The baseline snapshot is taken on the caller's thread before the
    /// thread is spawned, so the registry is populated when this returns and
    /// a change made right afterwards is reported by the first tick.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the OS refuses to create the thread.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(Worker::is_alive) {
            return Ok(());
        }
        let stale = worker.take();
        *worker = Some(self.spawn()?);
        drop(worker);
        if let Some(stale) = stale {
            stale.finish();
        }
        Ok(())
    }

    /// Takes the baseline and spawns the loop.  Called with `worker` locked.
    fn spawn(&self) -> Result<Worker, MonitorError> {
        let ticker = Ticker::new(&self.shared);
        let interval = self.interval();
        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let thread = thread::Builder::new()
            .name("monctl-watchdog".to_string())
            .spawn(move || run(shared, ticker, interval, stop_rx))
            .map_err(MonitorError::Spawn)?;

        info!(interval_ms = interval.as_millis() as u64, "monitor watchdog started");
        Ok(Worker { stop_tx, thread })
    }

    /// Asks the polling thread to exit at the next tick boundary and waits for
    /// it.  A tick already in progress runs to completion.
    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.finish();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(Worker::is_alive)
    }

    /// Sets the polling interval.  A zero interval is ignored.
    pub fn set_interval(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("ignoring zero watchdog interval");
            return;
        }
        *lock(&self.shared.interval) = interval;
    }

    pub fn interval(&self) -> Duration {
        *lock(&self.shared.interval)
    }

    /// Starts or stops the thread to match the current reasons to run.
    ///
    /// The decision and the start or take happen under the `worker` lock, so
    /// a concurrent register and unregister cannot leave a listener behind a
    /// stopped thread.  Joining happens after the lock is released.
    fn reconcile(&self) -> Result<(), MonitorError> {
        let retired = {
            let mut worker = lock(&self.worker);
            let should_run = self.is_update_info_enabled() || !self.shared.listeners.is_empty();
            let running = worker.as_ref().is_some_and(Worker::is_alive);
            match (should_run, running) {
                (true, false) => {
                    let stale = worker.take();
                    *worker = Some(self.spawn()?);
                    stale
                }
                (false, true) => worker.take(),
                _ => None,
            }
        };
        if let Some(retired) = retired {
            retired.finish();
        }
        Ok(())
    }

    // ── Update-info mode ──────────────────────────────────────────────────────

    /// Keeps the watchdog running without listeners so the registry stays
    /// current in the background.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the thread cannot be started.
    pub fn enable_update_info(&self) -> Result<(), MonitorError> {
        self.update_info.store(true, Ordering::Release);
        self.reconcile()
    }

    pub fn disable_update_info(&self) -> Result<(), MonitorError> {
        self.update_info.store(false, Ordering::Release);
        self.reconcile()
    }

    pub fn is_update_info_enabled(&self) -> bool {
        self.update_info.load(Ordering::Acquire)
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    fn register(&self, kind: ChangeKind, listener: Listener) -> Result<ListenerId, MonitorError> {
        let id = ListenerId::new();
        self.shared
            .listeners
            .list(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        debug!(%id, ?kind, "listener registered");
        self.reconcile()?;
        Ok(id)
    }

    fn unregister(&self, kind: ChangeKind, id: ListenerId) -> bool {
        let removed = {
            let mut list = self
                .shared
                .listeners
                .list(kind)
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = list.len();
            list.retain(|(other, _)| *other != id);
            list.len() != before
        };
        if removed {
            debug!(%id, ?kind, "listener unregistered");
            // Stopping never fails; only starting can.
            let _ = self.reconcile();
        }
        removed
    }

    fn is_registered(&self, kind: ChangeKind, id: ListenerId) -> bool {
        self.shared
            .listeners
            .list(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(other, _)| *other == id)
    }

    /// Registers a callback for [`ChangeKind::PlugCountChanged`] events and
    /// starts the watchdog if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] if the thread cannot be started.  The
    /// listener stays registered in that case.
    pub fn register_plug_listener(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, MonitorError> {
        self.register(ChangeKind::PlugCountChanged, Arc::new(listener))
    }

    /// Registers a callback for [`ChangeKind::PropertyChanged`] events and
    /// starts the watchdog if needed.
    ///
    /// # Errors
    ///
    /// As [`ChangeWatchdog::register_plug_listener`].
    pub fn register_change_listener(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, MonitorError> {
        self.register(ChangeKind::PropertyChanged, Arc::new(listener))
    }

    /// Returns `false` if `id` was not a registered plug listener.
    pub fn unregister_plug_listener(&self, id: ListenerId) -> bool {
        self.unregister(ChangeKind::PlugCountChanged, id)
    }

    /// Returns `false` if `id` was not a registered change listener.
    pub fn unregister_change_listener(&self, id: ListenerId) -> bool {
        self.unregister(ChangeKind::PropertyChanged, id)
    }

    pub fn is_plug_listener_registered(&self, id: ListenerId) -> bool {
        self.is_registered(ChangeKind::PlugCountChanged, id)
    }

    pub fn is_change_listener_registered(&self, id: ListenerId) -> bool {
        self.is_registered(ChangeKind::PropertyChanged, id)
    }
}

impl Drop for ChangeWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::mock::mock_state;
    use crate::infrastructure::backend::MockBackend;
    use monctl_core::{DisplayMode, Point, Size};
    use std::time::Instant;

    fn shared_for(backend: &MockBackend) -> Shared {
        Shared {
            registry: Arc::new(Mutex::new(MonitorRegistry::new(Arc::new(backend.clone())))),
            listeners: Listeners {
                plug: RwLock::new(Vec::new()),
                change: RwLock::new(Vec::new()),
            },
            interval: Mutex::new(DEFAULT_INTERVAL),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    // ── diff_snapshots ────────────────────────────────────────────────────────

    #[test]
    fn test_diff_reports_added_and_removed_names_as_plug_change() {
        // Arrange
        let a = mock_state(1920, 1080, Point::ORIGIN, true);
        let previous = BTreeMap::from([("A".to_string(), a.clone()), ("B".to_string(), a.clone())]);
        let next = BTreeMap::from([("A".to_string(), a.clone()), ("C".to_string(), a)]);

        // Act
        let diff = diff_snapshots(&previous, &next, &[]);

        // Assert
        assert_eq!(diff.plugged, names(&["B", "C"]));
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_diff_aggregates_property_changes() {
        let a = mock_state(1920, 1080, Point::ORIGIN, true);
        let b = mock_state(1920, 1080, Point::new(1920, 0), false);
        let previous = BTreeMap::from([("A".to_string(), a.clone()), ("B".to_string(), b.clone())]);
        let mut a2 = a;
        a2.mode = Some(DisplayMode::new(1280, 720, 60.0));
        let mut b2 = b;
        b2.position = Point::new(0, 1080);
        let next = BTreeMap::from([("A".to_string(), a2), ("B".to_string(), b2)]);

        let diff = diff_snapshots(&previous, &next, &[]);

        assert!(diff.plugged.is_empty());
        assert_eq!(diff.changed, names(&["A", "B"]));
    }

    #[test]
    fn test_diff_plug_takes_precedence_over_property_change() {
        // Arrange: B dropped out and came back with a new position
        let b = mock_state(1920, 1080, Point::new(1920, 0), false);
        let previous = BTreeMap::from([("B".to_string(), b.clone())]);
        let mut b2 = b;
        b2.position = Point::new(0, 1080);
        let next = BTreeMap::from([("B".to_string(), b2)]);

        // Act
        let diff = diff_snapshots(&previous, &next, &names(&["B"]));

        // Assert
        assert_eq!(diff.plugged, names(&["B"]));
        assert!(diff.changed.is_empty());
    }

    // ── Ticker ────────────────────────────────────────────────────────────────

    #[test]
    fn test_tick_without_changes_produces_no_events() {
        let backend = MockBackend::dual_1080p();
        let shared = shared_for(&backend);
        let mut ticker = Ticker::new(&shared);

        assert!(ticker.tick(&shared).is_empty());
    }

    #[test]
    fn test_tick_property_change_yields_one_change_event_and_no_plug_event() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let shared = shared_for(&backend);
        let mut ticker = Ticker::new(&shared);

        // Act
        backend.update("A", |s| {
            s.mode = Some(DisplayMode::new(1280, 720, 60.0));
            s.size = Size::new(1280, 720);
        });
        let events = ticker.tick(&shared);

        // Assert
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::PropertyChanged);
        assert_eq!(events[0].names, names(&["A"]));
        assert_eq!(events[0].snapshot["A"].size, Size::new(1280, 720));
    }

    #[test]
    fn test_tick_flap_within_grace_yields_single_plug_event() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let shared = shared_for(&backend);
        let mut ticker = Ticker::new(&shared);

        // Act
        let saved = backend.unplug("B").expect("B plugged");
        let gone = ticker.tick(&shared);
        backend.plug("B", saved);
        let back = ticker.tick(&shared);

        // Assert
        assert!(gone.is_empty(), "unexpected events while B was missing: {gone:?}");
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].kind, ChangeKind::PlugCountChanged);
        assert_eq!(back[0].names, names(&["B"]));
    }

    #[test]
    fn test_tick_lasting_unplug_yields_single_plug_event_after_grace() {
        let backend = MockBackend::dual_1080p();
        let shared = shared_for(&backend);
        let mut ticker = Ticker::new(&shared);

        backend.unplug("B");
        let first = ticker.tick(&shared);
        let second = ticker.tick(&shared);
        let third = ticker.tick(&shared);

        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].names, names(&["B"]));
        assert!(!second[0].snapshot.contains_key("B"));
        assert!(third.is_empty());
    }

    #[test]
    fn test_tick_failed_refresh_is_swallowed_and_retried() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let shared = shared_for(&backend);
        let mut ticker = Ticker::new(&shared);
        backend.fail_next_list(1);
        backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

        // Act
        let failed = ticker.tick(&shared);
        let retried = ticker.tick(&shared);

        // Assert
        assert!(failed.is_empty());
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].names, names(&["C"]));
    }

    // ── ChangeWatchdog ────────────────────────────────────────────────────────

    fn watchdog_for(backend: &MockBackend) -> ChangeWatchdog {
        let registry = Arc::new(Mutex::new(MonitorRegistry::new(Arc::new(backend.clone()))));
        let watchdog = ChangeWatchdog::new(registry);
        watchdog.set_interval(Duration::from_millis(10));
        watchdog
    }

    #[test]
    fn test_first_listener_starts_and_last_unregister_stops_watchdog() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        assert!(!watchdog.is_running());

        // Act
        let id = watchdog.register_plug_listener(|_| {}).expect("register");

        // Assert
        assert!(watchdog.is_running());
        assert!(watchdog.is_plug_listener_registered(id));
        assert!(!watchdog.is_change_listener_registered(id));

        assert!(watchdog.unregister_plug_listener(id));
        assert!(!watchdog.is_running());
        assert!(!watchdog.unregister_plug_listener(id));
    }

    #[test]
    fn test_update_info_keeps_watchdog_running_without_listeners() {
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);

        watchdog.enable_update_info().expect("enable");
        let id = watchdog.register_change_listener(|_| {}).expect("register");
        watchdog.unregister_change_listener(id);

        assert!(watchdog.is_running());
        watchdog.disable_update_info().expect("disable");
        assert!(!watchdog.is_running());
    }

    #[test]
    fn test_running_watchdog_dispatches_plug_event_to_listener() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        watchdog
            .register_plug_listener(move |e| lock(&sink).push(e.clone()))
            .expect("register");
        assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 2));

        // Act
        backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

        // Assert
        assert!(wait_for(Duration::from_secs(2), || !lock(&seen).is_empty()));
        let events = lock(&seen);
        assert_eq!(events[0].names, names(&["C"]));
    }

    #[test]
    fn test_panicking_listener_does_not_stop_the_loop() {
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        watchdog
            .register_change_listener(move |_| {
                *lock(&counter) += 1;
                panic!("listener failure");
            })
            .expect("register");
        assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 2));

        backend.update("A", |s| s.position = Point::new(0, 10));
        assert!(wait_for(Duration::from_secs(2), || *lock(&calls) == 1));
        backend.update("A", |s| s.position = Point::new(0, 20));

        assert!(wait_for(Duration::from_secs(2), || *lock(&calls) == 2));
        assert!(watchdog.is_running());
    }

    #[test]
    fn test_start_takes_baseline_on_callers_thread() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        let registry = Arc::clone(&watchdog.shared.registry);
        let seen: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        // Act
        watchdog
            .register_plug_listener(move |e| lock(&sink).push(e.clone()))
            .expect("register");
        let listed = backend.list_calls();
        let known = lock(&registry).monitors().len();
        backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

        // Assert: populated on return, and the plug right after is not lost
        assert_eq!(listed, 1);
        assert_eq!(known, 2);
        assert!(wait_for(Duration::from_secs(2), || !lock(&seen).is_empty()));
        assert_eq!(lock(&seen)[0].names, names(&["C"]));
    }

    #[test]
    fn test_interval_change_takes_effect_at_next_tick_boundary() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        watchdog.set_interval(Duration::from_millis(300));
        let started = Instant::now();
        watchdog.start().expect("start");

        // Act: shorten the interval while the first wait is in progress
        watchdog.set_interval(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(100));
        let during_first_wait = backend.list_calls();
        assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 2));
        let first_tick_after = started.elapsed();
        let first_tick_at = Instant::now();
        assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 5));
        let three_more_ticks = first_tick_at.elapsed();

        // Assert
        assert_eq!(during_first_wait, 1, "only the baseline ran during the old wait");
        assert!(first_tick_after >= Duration::from_millis(300));
        assert!(
            three_more_ticks < Duration::from_millis(300),
            "later ticks should use the new interval, took {three_more_ticks:?}"
        );
        watchdog.stop();
    }

    #[test]
    fn test_stop_ends_the_loop_and_no_tick_follows() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        watchdog.start().expect("start");
        assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 3));

        // Act
        watchdog.stop();
        let calls_at_stop = backend.list_calls();
        thread::sleep(Duration::from_millis(60));

        // Assert
        assert!(!watchdog.is_running());
        assert_eq!(backend.list_calls(), calls_at_stop);
    }

    #[test]
    fn test_stop_during_long_wait_returns_without_ticking() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = watchdog_for(&backend);
        watchdog.set_interval(Duration::from_secs(60));
        watchdog.start().expect("start");
        let asked = Instant::now();

        // Act
        watchdog.stop();

        // Assert
        assert!(asked.elapsed() < Duration::from_secs(5));
        assert!(!watchdog.is_running());
        assert_eq!(backend.list_calls(), 1);
    }

    #[test]
    fn test_concurrent_register_and_unregister_leave_watchdog_running() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let watchdog = Arc::new(watchdog_for(&backend));
        watchdog.set_interval(Duration::from_secs(60));

        for _ in 0..50 {
            let first = watchdog.register_plug_listener(|_| {}).expect("register");
            let barrier = Arc::new(std::sync::Barrier::new(2));

            // Act: drop the last listener while another thread adds one
            let (wd, gate) = (Arc::clone(&watchdog), Arc::clone(&barrier));
            let adder = thread::spawn(move || {
                gate.wait();
                wd.register_change_listener(|_| {}).expect("register")
            });
            barrier.wait();
            watchdog.unregister_plug_listener(first);
            let second = adder.join().expect("adder thread");

            // Assert
            assert!(watchdog.is_change_listener_registered(second));
            assert!(watchdog.is_running(), "listener registered but watchdog stopped");
            watchdog.unregister_change_listener(second);
            assert!(!watchdog.is_running());
        }
    }

    #[test]
    fn test_zero_interval_is_ignored() {
        let backend = MockBackend::new();
        let watchdog = watchdog_for(&backend);

        watchdog.set_interval(Duration::ZERO);

        assert_eq!(watchdog.interval(), Duration::from_millis(10));
    }
}
