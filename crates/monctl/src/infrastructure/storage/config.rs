//! TOML-based configuration persistence.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate config file:
//! - Windows:  `%APPDATA%\monctl\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/monctl/config.toml` or `~/.config/monctl/config.toml`
//! - macOS:    `~/Library/Application Support/monctl/config.toml`
//!
//! ```toml
//! [watchdog]
//! interval_ms = 500
//! update_info = false
//!
//! [logging]
//! log_level = "info"
//!
//! [platform]
//! overlap_allowed = false
//! ```
//!
//! Every field has a serde default, so an empty or partial file is valid and a
//! missing file yields [`AppConfig::default()`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use monctl_core::PlatformRules;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration and setup file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be serialized to TOML.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub platform: PlatformOverrides,
}

/// Background polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchdogConfig {
    /// Polling interval in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Keep the watchdog running without listeners so queries read the cache.
    #[serde(default)]
    pub update_info: bool,
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Optional overrides of the backend's placement rules.  Unset fields keep
/// the platform's value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_at_origin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_coordinates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_allowed: Option<bool>,
}

impl PlatformOverrides {
    /// `rules` with every set override applied.
    pub fn apply(&self, rules: PlatformRules) -> PlatformRules {
        PlatformRules {
            primary_mandatory: self.primary_mandatory.unwrap_or(rules.primary_mandatory),
            primary_at_origin: self.primary_at_origin.unwrap_or(rules.primary_at_origin),
            negative_coordinates: self.negative_coordinates.unwrap_or(rules.negative_coordinates),
            overlap_allowed: self.overlap_allowed.unwrap_or(rules.overlap_allowed),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_interval_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            update_info: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// As [`load_config_from`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if the file is absent.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// As [`save_config_to`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    write_toml(config, path)
}

/// Serializes `value` and writes it to `path`, creating parent directories.
pub(crate) fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `monctl`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("monctl"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("monctl"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("monctl"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
