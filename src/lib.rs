//! # Printlink
//!
//! Host-side G-code streaming engine for 3D printers and CNC controllers:
//! - Serial (USB) and TCP/IP links
//! - Checksummed, line-numbered send/ack protocol with resend recovery
//! - Pause, resume, cancel and recovery after a lost connection
//! - Print-time, layer and filament analysis of G-code documents
//!
//! ## Architecture
//!
//! Printlink is organized as a workspace with multiple crates:
//!
//! 1. **printlink-core** - Errors, units, controller reports, listeners, events
//! 2. **printlink-settings** - Configuration model and persistence
//! 3. **printlink-gcode** - Line parser, machine model, document analysis
//! 4. **printlink-communication** - Transports and the streaming host
//! 5. **printlink** - Facade that re-exports all of the above
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use printlink::{AnalyzerConfig, Document, HostController, StreamConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! printlink::init_logging()?;
//!
//! let host = HostController::new(StreamConfig::default());
//! host.connect("/dev/ttyUSB0", 115_200)?;
//! host.wait_online(Duration::from_secs(10));
//!
//! let document = Document::load_file("part.gcode", AnalyzerConfig::default())?;
//! host.start_print(Arc::new(document), 0)?;
//! # Ok(())
//! # }
//! ```

pub use printlink_core::{
    format_coordinate, ConnectionError, Error, EventDispatcher, GcodeError, JobError, JobPhase,
    ListenerHandle, ListenerRegistry, MeasurementSystem, PositionReport, PrintEvent,
    ProtocolError, Result, TemperatureReading, TemperatureReport, TransportError, MM_PER_INCH,
};

pub use printlink_settings::{
    Config, ConnectionSettings, MachineSettings, PauseSettings, SettingsError, SettingsResult,
    StreamingSettings,
};

pub use printlink_gcode::{
    parse_line, AnalyzerConfig, BoundingBox, Bounds, Command, CommandKind, Document,
    FileEncoding, FileReadStats, GcodeFileReader, Layer, LineParser, MachineState,
    MoveAnnotation, DIRECTIVE_MARKER,
};

pub use printlink_communication::{
    connect, list_ports, HostController, JobProgress, PauseSnapshot, PrintListener,
    RecoverySnapshot, Response, ResponseParser, SerialPortInfo, StreamConfig, Transport,
    TransportAddress, TransportKind, TransportOptions, PAUSE_DIRECTIVE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with thread names and line numbers
/// - RUST_LOG environment variable support
///
/// The library never installs a subscriber on its own; applications call
/// this once at startup if they have no logging setup of their own.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constants_are_set() {
        assert!(!VERSION.is_empty());
        assert!(BUILD_DATE.ends_with("UTC"));
    }

    #[test]
    fn second_logging_init_reports_an_error() {
        let first = init_logging();
        let second = init_logging();
        // Another test may have installed a subscriber first
        assert!(first.is_err() || second.is_err());
    }
}
