//! SetupSnapshot: capture and restore a full multi-monitor configuration.
//!
//! [`Setup::capture`] records the mutable properties of every attached
//! monitor, primary first.  [`restore`] replays them field by field in a fixed
//! order (attach, power, mode, orientation, scale, primary, position) so that
//! positions are applied once sizes are final.  Each field is attempted on its
//! own: a rejected value is recorded in the [`RestoreReport`] and the remaining
//! fields and monitors are still attempted.  Fields already at their saved
//! value are not written.
//!
//! # Restore order per monitor
//!
//! ```text
//! attach ─► power ─► mode ─► orientation ─► scale ─► primary ─► position
//!                     └── sizes final here ──┘                   ▲
//!                                                                 └─ uses them
//! ```
//!
//! Monitors are restored in the order they were captured.  A monitor whose
//! captured `Arc<Monitor>` went stale is looked up again by name; one that
//! cannot be found gets one `Failed` result per field rather
//! than aborting the restore.
//!
//! # Persisting a setup
//!
//! A [`Setup`] holds live monitor references and is not serializable.  Use
//! [`Setup::to_record`] for the plain [`SetupRecord`] written by
//! `infrastructure::storage::setup_file`, and [`Setup::from_record`] to turn a
//! loaded record back into something [`restore`] accepts.

use std::fmt;
use std::sync::Arc;

use monctl_core::{DisplayMode, Orientation, Point, PowerState, Scale};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::error::MonitorError;
use crate::application::registry::Monitor;

// ── Captured properties ───────────────────────────────────────────────────────

/// The restorable properties of one monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorProperties {
    pub name: String,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DisplayMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub power: PowerState,
}

impl MonitorProperties {
    pub fn of(monitor: &Monitor) -> Self {
        let state = monitor.state();
        Self {
            name: monitor.name(),
            position: state.position,
            mode: state.mode,
            orientation: state.orientation,
            scale: state.scale,
            is_primary: state.is_primary,
            power: state.power,
        }
    }
}

/// One captured monitor.  `monitor` is the object it was captured from; it is
/// `None` for setups loaded from a [`SetupRecord`].
#[derive(Debug, Clone)]
pub struct SetupEntry {
    pub monitor: Option<Arc<Monitor>>,
    pub properties: MonitorProperties,
}

/// An ordered capture of every monitor's properties.
#[derive(Debug, Clone, Default)]
pub struct Setup {
    entries: Vec<SetupEntry>,
}

impl Setup {
    /// Captures `monitors`, primary first, the rest in the given order.
    pub fn capture(monitors: &[Arc<Monitor>]) -> Self {
        let (primary, rest): (Vec<_>, Vec<_>) =
            monitors.iter().partition(|m| m.is_primary());
        let entries = primary
            .into_iter()
            .chain(rest)
            .map(|m| SetupEntry {
                monitor: Some(Arc::clone(m)),
                properties: MonitorProperties::of(m),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[SetupEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops the monitor references, keeping only what can be persisted.
    pub fn to_record(&self) -> SetupRecord {
        SetupRecord {
            monitors: self.entries.iter().map(|e| e.properties.clone()).collect(),
        }
    }

    /// A setup whose monitors are resolved by name at restore time.
    pub fn from_record(record: SetupRecord) -> Self {
        Self {
            entries: record
                .monitors
                .into_iter()
                .map(|properties| SetupEntry {
                    monitor: None,
                    properties,
                })
                .collect(),
        }
    }
}

/// Persistable form of a [`Setup`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupRecord {
    #[serde(default)]
    pub monitors: Vec<MonitorProperties>,
}

// ── Restore report ────────────────────────────────────────────────────────────

/// Restore steps, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetupField {
    Attach,
    Power,
    Mode,
    Orientation,
    Scale,
    Primary,
    Position,
}

impl SetupField {
    pub const ALL: [SetupField; 7] = [
        SetupField::Attach,
        SetupField::Power,
        SetupField::Mode,
        SetupField::Orientation,
        SetupField::Scale,
        SetupField::Primary,
        SetupField::Position,
    ];
}

impl fmt::Display for SetupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupField::Attach => "attach",
            SetupField::Power => "power",
            SetupField::Mode => "mode",
            SetupField::Orientation => "orientation",
            SetupField::Scale => "scale",
            SetupField::Primary => "primary",
            SetupField::Position => "position",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Already at the saved value; nothing written.
    Unchanged,
    Applied,
    /// The platform did not report this field at capture time.
    NotCaptured,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRestoreResult {
    pub monitor: String,
    pub field: SetupField,
    pub outcome: RestoreOutcome,
}

/// Per-monitor, per-field outcome of a [`restore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub results: Vec<FieldRestoreResult>,
}

impl RestoreReport {
    pub fn failures(&self) -> impl Iterator<Item = &FieldRestoreResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, RestoreOutcome::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Fields that were actually written.
    pub fn applied(&self) -> impl Iterator<Item = &FieldRestoreResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == RestoreOutcome::Applied)
    }

    /// # Errors
    ///
    /// Returns [`MonitorError::PartialRestoreFailure`] carrying the report if
    /// any field failed.
    pub fn into_result(self) -> Result<RestoreReport, MonitorError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(MonitorError::PartialRestoreFailure(self))
        }
    }
}

// ── Restore ───────────────────────────────────────────────────────────────────

/// Compares one captured value against the live one and writes it if needed.
fn step<T: PartialEq>(
    saved: Option<T>,
    current: Option<T>,
    write: impl FnOnce(T) -> Result<(), MonitorError>,
) -> RestoreOutcome {
    let Some(saved) = saved else {
        return RestoreOutcome::NotCaptured;
    };
    if current.as_ref() == Some(&saved) {
        return RestoreOutcome::Unchanged;
    }
    match write(saved) {
        Ok(()) => RestoreOutcome::Applied,
        Err(e) => RestoreOutcome::Failed(e.to_string()),
    }
}

fn restore_field(monitor: &Monitor, saved: &MonitorProperties, field: SetupField) -> RestoreOutcome {
    match field {
        SetupField::Attach => {
            let attach = saved.power != PowerState::Detached;
            step(Some(attach), Some(monitor.is_attached()), |attach| {
                if attach {
                    monitor.attach()
                } else {
                    monitor.detach()
                }
            })
        }
        SetupField::Power => {
            let wanted = (saved.power != PowerState::Detached).then_some(saved.power);
            match wanted {
                // Detachment is handled by the attach step.
                None => RestoreOutcome::Unchanged,
                Some(_) => step(wanted, Some(monitor.power()), |power| match power {
                    PowerState::Off => monitor.turn_off(),
                    PowerState::Suspended => monitor.suspend(),
                    _ => monitor.turn_on(),
                }),
            }
        }
        SetupField::Mode => step(saved.mode, monitor.mode(), |m| monitor.set_mode(m)),
        SetupField::Orientation => step(saved.orientation, monitor.orientation(), |o| {
            monitor.set_orientation(o)
        }),
        SetupField::Scale => step(saved.scale, monitor.scale(), |s| monitor.set_scale(s)),
        SetupField::Primary => {
            // Only the monitor saved as primary acts; making it primary demotes
            // the others.
            if saved.is_primary {
                step(Some(true), Some(monitor.is_primary()), |_| monitor.set_primary())
            } else {
                RestoreOutcome::Unchanged
            }
        }
        SetupField::Position => step(Some(saved.position), Some(monitor.position()), |p| {
            monitor.set_position(p)
        }),
    }
}

/// Restores `setup` entry by entry, in saved order.
///
/// An entry whose captured monitor went stale (or that came from a
/// [`SetupRecord`]) is re-resolved by name through `resolve`.  Returns a report
/// listing every field of every entry; inspect it or call
/// [`RestoreReport::into_result`].
pub fn restore(setup: &Setup, resolve: impl Fn(&str) -> Option<Arc<Monitor>>) -> RestoreReport {
    let mut report = RestoreReport::default();

    for entry in setup.entries() {
        let saved = &entry.properties;
        let monitor = entry
            .monitor
            .as_ref()
            .filter(|m| m.is_valid())
            .cloned()
            .or_else(|| resolve(&saved.name));

        let Some(monitor) = monitor else {
            warn!(monitor = %saved.name, "cannot restore a monitor that is not attached");
            report.results.extend(SetupField::ALL.iter().map(|field| FieldRestoreResult {
                monitor: saved.name.clone(),
                field: *field,
                outcome: RestoreOutcome::Failed(format!("no monitor named {}", saved.name)),
            }));
            continue;
        };

        for field in SetupField::ALL {
            let outcome = restore_field(&monitor, saved, field);
            match &outcome {
                RestoreOutcome::Failed(reason) => {
                    warn!(monitor = %saved.name, %field, %reason, "restore step failed");
                }
                RestoreOutcome::Applied => debug!(monitor = %saved.name, %field, "restored"),
                _ => {}
            }
            report.results.push(FieldRestoreResult {
                monitor: saved.name.clone(),
                field,
                outcome,
            });
        }
    }

    report
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::MonitorRegistry;
    use crate::infrastructure::backend::mock::mock_state;
    use crate::infrastructure::backend::{MockBackend, UpdateField};

    fn setup_registry(backend: &MockBackend) -> MonitorRegistry {
        let mut registry = MonitorRegistry::new(Arc::new(backend.clone()));
        registry.refresh().expect("refresh");
        registry
    }

    #[test]
    fn test_capture_orders_primary_first() {
        // Arrange
        let backend = MockBackend::new();
        backend.plug("L", mock_state(1280, 1024, Point::ORIGIN, false));
        backend.plug("P", mock_state(1920, 1080, Point::new(1280, 0), true));
        let registry = setup_registry(&backend);

        // Act
        let setup = Setup::capture(&registry.monitors());

        // Assert
        let order: Vec<&str> = setup
            .entries()
            .iter()
            .map(|e| e.properties.name.as_str())
            .collect();
        assert_eq!(order, vec!["P", "L"]);
    }

    #[test]
    fn test_restore_of_fresh_capture_writes_nothing() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());

        // Act
        let report = restore(&setup, |name| registry.get(name));

        // Assert
        assert!(report.is_complete());
        assert_eq!(report.applied().count(), 0);
        assert!(backend.set_calls().is_empty());
    }

    #[test]
    fn test_restore_reapplies_changed_mode_and_position() {
        // Arrange
        let backend = MockBackend::new();
        let mut state = mock_state(1920, 1080, Point::ORIGIN, true);
        state.all_modes.push(DisplayMode::new(1280, 720, 60.0));
        backend.plug("A", state);
        backend.plug("B", mock_state(1920, 1080, Point::new(1920, 0), false));
        let registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());
        let a = registry.get("A").expect("A");
        let b = registry.get("B").expect("B");
        a.set_mode(DisplayMode::new(1280, 720, 60.0)).expect("mode");
        b.set_position(Point::new(1280, 0)).expect("position");
        backend.clear_set_calls();

        // Act
        let report = restore(&setup, |name| registry.get(name));

        // Assert
        assert!(report.is_complete());
        let applied: Vec<(String, SetupField)> = report
            .applied()
            .map(|r| (r.monitor.clone(), r.field))
            .collect();
        assert_eq!(
            applied,
            vec![
                ("A".to_string(), SetupField::Mode),
                ("B".to_string(), SetupField::Position),
            ]
        );
        assert_eq!(a.mode(), Some(DisplayMode::new(1920, 1080, 60.0)));
        assert_eq!(b.position(), Point::new(1920, 0));
    }

    #[test]
    fn test_restore_continues_after_a_rejected_field() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());
        let a = registry.get("A").expect("A");
        a.set_orientation(Orientation::Left).expect("rotate");
        registry.get("B").expect("B").set_position(Point::new(0, 1920)).expect("move");
        backend.reject(UpdateField::Orientation);

        // Act
        let report = restore(&setup, |name| registry.get(name));

        // Assert
        let failures: Vec<(&str, SetupField)> = report
            .failures()
            .map(|r| (r.monitor.as_str(), r.field))
            .collect();
        assert_eq!(failures, vec![("A", SetupField::Orientation)]);
        assert_eq!(backend.state("B").expect("B").position, Point::new(1920, 0));
        assert!(matches!(
            report.into_result(),
            Err(MonitorError::PartialRestoreFailure(_))
        ));
    }

    #[test]
    fn test_restore_reresolves_stale_monitor_by_name() {
        // Arrange
        let backend = MockBackend::dual_1080p();
        let mut registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());
        let saved = backend.unplug("B").expect("B");
        registry.refresh().expect("refresh");
        registry.refresh().expect("refresh");
        let mut moved = saved;
        moved.position = Point::new(0, 1080);
        backend.plug("B", moved);
        registry.refresh().expect("refresh");

        // Act
        let report = restore(&setup, |name| registry.get(name));

        // Assert
        assert!(report.is_complete(), "{report:?}");
        assert_eq!(backend.state("B").expect("B").position, Point::new(1920, 0));
    }

    #[test]
    fn test_restore_reports_every_field_of_missing_monitor() {
        let backend = MockBackend::dual_1080p();
        let registry = setup_registry(&backend);
        let record = SetupRecord {
            monitors: vec![MonitorProperties {
                name: "GONE".to_string(),
                position: Point::ORIGIN,
                mode: None,
                orientation: None,
                scale: None,
                is_primary: false,
                power: PowerState::On,
            }],
        };

        let report = restore(&Setup::from_record(record), |name| registry.get(name));

        assert_eq!(report.failures().count(), SetupField::ALL.len());
    }

    #[test]
    fn test_restore_turns_monitor_back_on() {
        let backend = MockBackend::dual_1080p();
        let registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());
        registry.get("B").expect("B").turn_off().expect("off");

        let report = restore(&setup, |name| registry.get(name));

        assert!(report.is_complete());
        assert_eq!(backend.state("B").expect("B").power, PowerState::On);
    }

    #[test]
    fn test_record_keeps_capture_order_and_properties() {
        let backend = MockBackend::dual_1080p();
        let registry = setup_registry(&backend);
        let setup = Setup::capture(&registry.monitors());

        let record = setup.to_record();
        let reloaded = Setup::from_record(record.clone());

        assert_eq!(record.monitors.len(), 2);
        assert_eq!(record.monitors[0].name, "A");
        assert!(record.monitors[0].is_primary);
        assert!(reloaded.entries().iter().all(|e| e.monitor.is_none()));
        assert_eq!(reloaded.to_record(), record);
    }
}
