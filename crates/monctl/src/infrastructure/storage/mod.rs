//! Storage infrastructure: TOML files on disk.
//!
//! - **`config`** – the application config (`config.toml` in the platform
//!   config directory): watchdog interval, update-info mode, log level and
//!   placement-rule overrides.  A missing file yields defaults.
//! - **`setup_file`** – saved monitor setups and arrangement files at
//!   caller-chosen paths.

pub mod config;
pub mod setup_file;
