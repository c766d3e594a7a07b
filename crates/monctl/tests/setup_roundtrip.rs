//! Save / restore scenarios across the public API, including persistence of
//! the setup through a TOML file.

use std::sync::Arc;

use monctl::infrastructure::backend::{mock_state, MockBackend, UpdateField};
use monctl::infrastructure::storage::setup_file::{load_setup_record, save_setup_record};
use monctl::{
    ArrangementSpec, DisplayMode, MonitorManager, Orientation, PlatformRules, Point,
    RelativePosition, RestoreOutcome, SetupField,
};

fn manager(backend: &MockBackend) -> MonitorManager {
    MonitorManager::new(Arc::new(backend.clone())).with_rules(PlatformRules::WINDOWS)
}

#[test]
fn test_restore_immediately_after_save_changes_nothing() {
    // Arrange
    let backend = MockBackend::dual_1080p();
    let mgr = manager(&backend);
    let before = (backend.state("A"), backend.state("B"));

    // Act
    let report = mgr.restore_setup(&mgr.save_setup());

    // Assert
    assert!(report.is_complete());
    assert!(report
        .results
        .iter()
        .all(|r| matches!(r.outcome, RestoreOutcome::Unchanged)));
    assert!(backend.set_calls().is_empty());
    assert_eq!((backend.state("A"), backend.state("B")), before);
}

#[test]
fn test_setup_file_restores_arrangement_after_rearranging() {
    // Arrange
    let backend = MockBackend::dual_1080p();
    let mgr = manager(&backend);
    let dir = std::env::temp_dir().join(format!("monctl_it_{}", uuid::Uuid::new_v4()));
    let path = dir.join("setup.toml");
    save_setup_record(&mgr.save_setup().to_record(), &path).expect("save");

    let spec = ArrangementSpec::new()
        .with("A", RelativePosition::Primary, None)
        .with("B", RelativePosition::AboveCentered, Some("A"));
    mgr.arrange_monitors(&spec).expect("arrange");
    assert_eq!(backend.state("B").expect("B").position, Point::new(0, -1080));

    // Act
    let record = load_setup_record(&path).expect("load");
    let report = mgr.restore_setup_record(record);

    // Assert
    assert!(report.is_complete(), "{report:?}");
    assert_eq!(backend.state("B").expect("B").position, Point::new(1920, 0));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_restore_applies_position_after_mode_and_orientation() {
    // Arrange
    let backend = MockBackend::new();
    let mut a = mock_state(1920, 1080, Point::ORIGIN, true);
    a.all_modes.push(DisplayMode::new(1280, 1024, 60.0));
    backend.plug("A", a);
    backend.plug("B", mock_state(1920, 1080, Point::new(1920, 0), false));
    let mgr = manager(&backend);
    let setup = mgr.save_setup();

    let a = mgr.find_monitor_with_name("A").expect("A");
    a.set_mode(DisplayMode::new(1280, 1024, 60.0)).expect("mode");
    a.set_orientation(Orientation::Right).expect("rotate");
    mgr.find_monitor_with_name("B")
        .expect("B")
        .set_position(Point::new(1024, 0))
        .expect("move");
    backend.clear_set_calls();

    // Act
    let report = mgr.restore_setup(&setup);

    // Assert
    assert!(report.is_complete(), "{report:?}");
    let order: Vec<(String, String)> = backend
        .set_calls()
        .into_iter()
        .map(|(name, update)| {
            let fields: Vec<String> = update.fields().iter().map(ToString::to_string).collect();
            (name, fields.join("+"))
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("A".to_string(), "mode".to_string()),
            ("A".to_string(), "orientation".to_string()),
            ("B".to_string(), "position".to_string()),
        ]
    );
    assert_eq!(a.size(), mock_state(1920, 1080, Point::ORIGIN, true).size);
}

#[test]
fn test_one_rejected_field_does_not_block_other_monitors() {
    let backend = MockBackend::dual_1080p();
    let mgr = manager(&backend);
    let setup = mgr.save_setup();
    mgr.find_monitor_with_name("A")
        .expect("A")
        .turn_off()
        .expect("off");
    mgr.find_monitor_with_name("B")
        .expect("B")
        .set_position(Point::new(0, 1080))
        .expect("move");
    backend.reject(UpdateField::Power);

    let report = mgr.restore_setup(&setup);

    let failed: Vec<(String, SetupField)> = report
        .failures()
        .map(|r| (r.monitor.clone(), r.field))
        .collect();
    assert_eq!(failed, vec![("A".to_string(), SetupField::Power)]);
    assert_eq!(backend.state("B").expect("B").position, Point::new(1920, 0));
    assert!(report.into_result().is_err());
}
