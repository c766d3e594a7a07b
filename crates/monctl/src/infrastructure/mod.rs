//! Infrastructure layer: everything that touches the OS or the file system.
//!
//! **Dependency rule**: this layer may depend on `monctl_core`; the
//! application layer reaches it only through the [`MonitorBackend`] trait and
//! the storage functions.
//!
//! - **`backend`** – [`MonitorBackend`] and its per-OS implementations,
//!   selected at compile time with `#[cfg(target_os)]`, plus an always-compiled
//!   scriptable `MockBackend` for tests.
//! - **`storage`** – TOML config and setup files.
//!
//! [`MonitorBackend`]: backend::MonitorBackend

pub mod backend;
pub mod storage;
