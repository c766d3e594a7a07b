//! Saved setups and arrangement files.
//!
//! A setup file is a [`SetupRecord`] in TOML, one `[[monitors]]` table per
//! monitor in restore order:
//!
//! ```toml
//! [[monitors]]
//! name = "DP-1"
//! position = { x = 0, y = 0 }
//! mode = { width = 2560, height = 1440, frequency = 144.0 }
//! orientation = "normal"
//! is_primary = true
//! power = "on"
//! ```
//!
//! An arrangement file maps monitor names to placements:
//!
//! ```toml
//! DP-1 = { placement = "PRIMARY" }
//! HDMI-1 = { placement = "LEFT_TOP", relative_to = "DP-1" }
//! eDP-1 = { placement = { x = 0, y = 1440 }, relative_to = "DP-1" }
//! ```

use std::path::Path;

use monctl_core::ArrangementSpec;
use serde::de::DeserializeOwned;

use super::config::{write_toml, ConfigError};
use crate::application::snapshot::SetupRecord;

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Writes `record` to `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_setup_record(record: &SetupRecord, path: &Path) -> Result<(), ConfigError> {
    write_toml(record, path)
}

/// Reads a setup file.  Unlike the app config, a missing file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
pub fn load_setup_record(path: &Path) -> Result<SetupRecord, ConfigError> {
    read_toml(path)
}

/// Reads an arrangement file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
pub fn load_arrangement(path: &Path) -> Result<ArrangementSpec, ConfigError> {
    read_toml(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::snapshot::MonitorProperties;
    use monctl_core::{DisplayMode, Orientation, Placement, Point, PowerState, RelativePosition};
    use uuid::Uuid;

    #[test]
    fn test_setup_record_survives_save_and_load() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("monctl_test_{}", Uuid::new_v4()));
        let path = dir.join("desk.toml");
        let record = SetupRecord {
            monitors: vec![
                MonitorProperties {
                    name: "DP-1".to_string(),
                    position: Point::ORIGIN,
                    mode: Some(DisplayMode::new(2560, 1440, 144.0)),
                    orientation: Some(Orientation::Normal),
                    scale: Some((125.0, 125.0)),
                    is_primary: true,
                    power: PowerState::On,
                },
                MonitorProperties {
                    name: "HDMI-1".to_string(),
                    position: Point::new(-1080, -480),
                    mode: None,
                    orientation: Some(Orientation::Left),
                    scale: None,
                    is_primary: false,
                    power: PowerState::Off,
                },
            ],
        };

        // Act
        save_setup_record(&record, &path).expect("save");
        let loaded = load_setup_record(&path).expect("load");

        // Assert
        assert_eq!(loaded, record);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_setup_record_missing_file_is_io_error() {
        let result = load_setup_record(Path::new("/nonexistent/monctl/setup.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_arrangement_file_parses_symbolic_and_offset_placements() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("monctl_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("layout.toml");
        std::fs::write(
            &path,
            r#"
"DP-1" = { placement = "PRIMARY" }
"HDMI-1" = { placement = "LEFT_TOP", relative_to = "DP-1" }
"eDP-1" = { placement = { x = 0, y = 1440 }, relative_to = "DP-1" }
"#,
        )
        .expect("write");

        // Act
        let spec = load_arrangement(&path).expect("load");

        // Assert
        assert_eq!(spec.len(), 3);
        assert_eq!(spec.primary(), Some("DP-1"));
        let hdmi = spec.get("HDMI-1").expect("HDMI-1");
        assert_eq!(hdmi.placement, Placement::Relative(RelativePosition::LeftTop));
        assert_eq!(hdmi.relative_to.as_deref(), Some("DP-1"));
        let edp = spec.get("eDP-1").expect("eDP-1");
        assert_eq!(edp.placement, Placement::Offset(Point::new(0, 1440)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
