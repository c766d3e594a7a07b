//! End-to-end watchdog scenarios through the public `MonitorManager` surface,
//! driven by the scriptable mock backend.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use monctl::infrastructure::backend::{mock_state, MockBackend};
use monctl::{ChangeEvent, ChangeKind, DisplayMode, MonitorManager, PlatformRules, Point, Size};

type Events = Arc<Mutex<Vec<ChangeEvent>>>;

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

fn recorded(events: &Events) -> Vec<ChangeEvent> {
    events.lock().map(|e| e.clone()).unwrap_or_default()
}

/// Manager polling every 10 ms with plug and change listeners recording into
/// separate lists.  Returns once the watchdog has taken its baseline.
fn watched(backend: &MockBackend) -> (MonitorManager, Events, Events) {
    let manager = MonitorManager::new(Arc::new(backend.clone())).with_rules(PlatformRules::WINDOWS);
    manager.set_watchdog_interval(Duration::from_millis(10));

    let plugs: Events = Arc::default();
    let changes: Events = Arc::default();
    let sink = Arc::clone(&plugs);
    manager
        .register_plug_listener(move |e| sink.lock().expect("lock").push(e.clone()))
        .expect("register plug listener");
    let sink = Arc::clone(&changes);
    manager
        .register_change_listener(move |e| sink.lock().expect("lock").push(e.clone()))
        .expect("register change listener");

    let calls = backend.list_calls();
    assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= calls + 2));
    (manager, plugs, changes)
}

#[test]
fn test_resolution_change_yields_one_change_event_and_no_plug_event() {
    // Arrange
    let backend = MockBackend::new();
    let mut a = mock_state(1920, 1080, Point::ORIGIN, true);
    a.all_modes.push(DisplayMode::new(1280, 720, 60.0));
    backend.plug("A", a);
    backend.plug("B", mock_state(1920, 1080, Point::new(1920, 0), false));
    let (manager, plugs, changes) = watched(&backend);

    // Act
    manager
        .find_monitor_with_name("A")
        .expect("A")
        .set_mode(DisplayMode::new(1280, 720, 60.0))
        .expect("set mode");

    // Assert
    assert!(wait_for(Duration::from_secs(2), || !recorded(&changes).is_empty()));
    thread::sleep(Duration::from_millis(50));
    let changes = recorded(&changes);
    assert_eq!(changes.len(), 1, "{changes:?}");
    assert_eq!(changes[0].kind, ChangeKind::PropertyChanged);
    assert_eq!(changes[0].names, vec!["A"]);
    assert_eq!(changes[0].snapshot["A"].size, Size::new(1280, 720));
    assert!(recorded(&plugs).is_empty());
}

#[test]
fn test_new_monitor_is_reported_once_as_plug_event() {
    let backend = MockBackend::dual_1080p();
    let (manager, plugs, changes) = watched(&backend);

    backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

    assert!(wait_for(Duration::from_secs(2), || !recorded(&plugs).is_empty()));
    thread::sleep(Duration::from_millis(50));
    let plugs = recorded(&plugs);
    assert_eq!(plugs.len(), 1);
    assert_eq!(plugs[0].names, vec!["C"]);
    assert!(recorded(&changes).is_empty());
    assert_eq!(manager.monitors_count(), 3);
}

#[test]
fn test_unplugged_monitor_is_reported_once_after_grace_refresh() {
    let backend = MockBackend::dual_1080p();
    let (manager, plugs, _changes) = watched(&backend);
    let b = manager.find_monitor_with_name("B").expect("B");

    backend.unplug("B");

    assert!(wait_for(Duration::from_secs(2), || !recorded(&plugs).is_empty()));
    thread::sleep(Duration::from_millis(50));
    let plugs = recorded(&plugs);
    assert_eq!(plugs.len(), 1);
    assert_eq!(plugs[0].names, vec!["B"]);
    assert!(!plugs[0].snapshot.contains_key("B"));
    assert!(!b.is_valid());
    assert_eq!(manager.monitors_count(), 1);
}

#[test]
fn test_listener_can_unregister_itself_from_the_watchdog_thread() {
    // Arrange
    let backend = MockBackend::dual_1080p();
    let manager = Arc::new(MonitorManager::new(Arc::new(backend.clone())));
    manager.set_watchdog_interval(Duration::from_millis(10));
    let fired = Arc::new(Mutex::new(0u32));
    let id_slot = Arc::new(Mutex::new(None));

    let weak = Arc::downgrade(&manager);
    let counter = Arc::clone(&fired);
    let slot = Arc::clone(&id_slot);
    let id = manager
        .register_plug_listener(move |_| {
            *counter.lock().expect("lock") += 1;
            let id = *slot.lock().expect("lock");
            if let (Some(manager), Some(id)) = (weak.upgrade(), id) {
                manager.unregister_plug_listener(id);
            }
        })
        .expect("register");
    *id_slot.lock().expect("lock") = Some(id);
    assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 2));

    // Act
    backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

    // Assert
    assert!(wait_for(Duration::from_secs(2), || !manager.is_watchdog_enabled()));
    backend.plug("D", mock_state(1280, 1024, Point::new(5120, 0), false));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*fired.lock().expect("lock"), 1);
    assert!(!manager.is_plug_listener_registered(id));
}

#[tokio::test]
async fn test_events_can_be_forwarded_to_an_async_task() {
    // Arrange: forward plug events over a tokio channel, as the CLI does
    let backend = MockBackend::dual_1080p();
    let manager = MonitorManager::new(Arc::new(backend.clone()));
    manager.set_watchdog_interval(Duration::from_millis(10));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChangeEvent>();
    manager
        .register_plug_listener(move |e| {
            let _ = tx.send(e.clone());
        })
        .expect("register");
    assert!(wait_for(Duration::from_secs(2), || backend.list_calls() >= 2));

    // Act
    backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");

    // Assert
    assert_eq!(event.kind, ChangeKind::PlugCountChanged);
    assert_eq!(event.names, vec!["C"]);
}

#[test]
fn test_plug_immediately_after_registering_is_reported() {
    // Arrange
    let backend = MockBackend::dual_1080p();
    let manager = MonitorManager::new(Arc::new(backend.clone()));
    manager.set_watchdog_interval(Duration::from_millis(10));
    let plugs: Events = Arc::default();
    let sink = Arc::clone(&plugs);

    // Act: no wait between registering and the plug
    manager
        .register_plug_listener(move |e| sink.lock().expect("lock").push(e.clone()))
        .expect("register");
    let count_on_register = manager.monitors_count();
    backend.plug("C", mock_state(1280, 1024, Point::new(3840, 0), false));

    // Assert
    assert_eq!(count_on_register, 2);
    assert!(wait_for(Duration::from_secs(2), || !recorded(&plugs).is_empty()));
    let events = recorded(&plugs);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].names, vec!["C"]);
    assert_eq!(manager.monitors_count(), 3);
}
