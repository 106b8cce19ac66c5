//! Printlink Settings Crate
//!
//! Handles host configuration: connection, streaming, pause and machine
//! sections, persisted as JSON or TOML.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, MachineSettings, PauseSettings, StreamingSettings};
pub use error::{SettingsError, SettingsResult};
