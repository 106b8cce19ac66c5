//! Configuration and settings management for Printlink
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (address, baud, read timeout, hang-up policy)
//! - Streaming settings (handshake and flow-control tuning)
//! - Pause settings (on-pause script, travel feeds used on resume)
//! - Machine settings (home position, acceleration, layer height)

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial device path or `host:port`
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Bounded wait for one line from the controller, in milliseconds
    pub read_timeout_ms: u64,
    /// Put the serial hang-up-on-close flag back the way it was found when
    /// disconnecting. Restoring it means the close itself may reset the board.
    pub restore_hangup_on_disconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            read_timeout_ms: 250,
            restore_hangup_on_disconnect: true,
        }
    }
}

/// Handshake and flow-control tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// How often blocked loops re-check the stop flag, in milliseconds
    pub poll_interval_ms: u64,
    /// Consecutive empty reads before the status poll is sent again
    pub handshake_empty_reads: u32,
    /// Status polls sent before the handshake is abandoned
    pub handshake_attempts: u32,
    /// Consecutive write failures that end the connection
    pub write_failure_limit: u32,
    /// Boot banners that mark the controller online, matched as prefixes
    pub greetings: Vec<String>,
    /// Skip acknowledgement waits on TCP links
    pub tcp_streaming: bool,
    /// Benign command sent during the handshake
    pub status_poll_command: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            handshake_empty_reads: 15,
            handshake_attempts: 20,
            write_failure_limit: 4,
            greetings: vec!["start".to_string(), "Grbl ".to_string()],
            tcp_streaming: false,
            status_poll_command: "M105".to_string(),
        }
    }
}

/// Pause and resume behaviour
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseSettings {
    /// Commands queued when a job is paused
    pub on_pause_script: Vec<String>,
    /// Feed rate for the XY move back to the pause point; captured feed if unset
    pub xy_feed: Option<f64>,
    /// Feed rate for the Z move back to the pause point
    pub z_feed: Option<f64>,
}

/// Machine model used by the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Position reported after homing, X/Y/Z in mm
    pub home: [f64; 3],
    /// Acceleration for print-time estimates, mm/s²
    pub acceleration: f64,
    /// Known layer height; inferred from the file when unset
    pub layer_height: Option<f64>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            home: [0.0, 0.0, 0.0],
            acceleration: 1500.0,
            layer_height: None,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Pause settings
    pub pause: PauseSettings,
    /// Machine settings
    pub machine: MachineSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config location: `<platform config dir>/printlink/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("printlink").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config from `path`, or defaults when the file does not exist.
    ///
    /// A file that exists but fails to parse or validate is an error.
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid(
                "connection.baud_rate",
                "must be > 0",
            ));
        }

        if self.connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.read_timeout_ms",
                "must be > 0",
            ));
        }

        let streaming = &self.streaming;
        if streaming.poll_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "streaming.poll_interval_ms",
                "must be > 0",
            ));
        }

        if streaming.handshake_empty_reads == 0 || streaming.handshake_attempts == 0 {
            return Err(SettingsError::invalid(
                "streaming.handshake",
                "retry limits must be > 0",
            ));
        }

        if streaming.write_failure_limit == 0 {
            return Err(SettingsError::invalid(
                "streaming.write_failure_limit",
                "must be > 0",
            ));
        }

        if streaming.status_poll_command.trim().is_empty() {
            return Err(SettingsError::invalid(
                "streaming.status_poll_command",
                "must not be empty",
            ));
        }

        for (key, feed) in [("pause.xy_feed", self.pause.xy_feed), ("pause.z_feed", self.pause.z_feed)] {
            if feed.is_some_and(|f| f <= 0.0) {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        if self.machine.acceleration <= 0.0 {
            return Err(SettingsError::invalid(
                "machine.acceleration",
                "must be > 0",
            ));
        }

        if self.machine.layer_height.is_some_and(|h| h <= 0.0) {
            return Err(SettingsError::invalid(
                "machine.layer_height",
                "must be > 0",
            ));
        }

        Ok(())
    }
}
