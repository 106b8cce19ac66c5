//! Error handling for Printlink
//!
//! Provides error types for every layer of the host:
//! - Connection errors (opening a port or socket)
//! - Transport errors (reads and writes on an open link)
//! - Protocol errors (malformed controller replies)
//! - Job errors (print state machine violations)
//! - G-Code errors (parsing/loading)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Raised while establishing a link to a controller. These are fatal to the
/// connect attempt and are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// The current user may not open the port
    #[error("Permission denied opening {port}")]
    PermissionDenied {
        /// The port that could not be opened.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortBusy {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Address could not be interpreted as a device or `host:port`
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
    },

    /// Failed to resolve hostname
    #[error("Failed to resolve hostname {hostname}")]
    HostnameResolution {
        /// The hostname that failed to resolve.
        hostname: String,
    },

    /// TCP connection error
    #[error("TCP connection error: {reason}")]
    TcpError {
        /// The reason for the TCP error.
        reason: String,
    },

    /// Controller never answered the status poll
    #[error("Controller did not come online: {reason}")]
    HandshakeFailed {
        /// Why the handshake was abandoned.
        reason: String,
    },

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Connect called while a link is open
    #[error("Already connected")]
    AlreadyConnected,
}

/// Errors on an already open link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Writing to the link failed
    #[error("Write failed: {reason}")]
    Write {
        /// The reason the write failed.
        reason: String,
    },

    /// Reading from the link failed
    #[error("Read failed: {reason}")]
    Read {
        /// The reason the read failed.
        reason: String,
    },

    /// The remote end closed the link
    #[error("Connection closed by peer")]
    Eof,

    /// The transport was closed locally
    #[error("Transport closed")]
    Closed,
}

/// Protocol violations reported by or detected in controller replies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A resend request whose line number could not be extracted
    #[error("Unparseable resend request: {line}")]
    UnparseableResend {
        /// The received line.
        line: String,
    },

    /// Controller asked for a line that was never sent or is no longer retained
    #[error("Resend requested for unknown line {line_number}")]
    ResendUnavailable {
        /// The requested line number.
        line_number: u64,
    },
}

/// Print job state machine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Requested transition is not valid from the current phase
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidStateTransition {
        /// The current phase name.
        current: String,
        /// The requested phase name.
        requested: String,
    },

    /// Controller is not online
    #[error("Controller is not online")]
    Offline,

    /// No recovery snapshot is available
    #[error("Nothing to recover")]
    NothingToRecover,
}

/// G-Code error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcodeError {
    /// Line contained nothing the parser could tokenize
    #[error("Untokenizable line {line_index}: {text}")]
    Untokenizable {
        /// Zero-based index of the line within its document.
        line_index: usize,
        /// The trimmed line text.
        text: String,
    },

    /// Layer index out of range
    #[error("Layer {layer} out of range ({count} layers)")]
    LayerOutOfRange {
        /// The requested layer.
        layer: usize,
        /// Number of layers in the document.
        count: usize,
    },

    /// File loading error
    #[error("File error: {reason}")]
    FileError {
        /// The reason for the file error.
        reason: String,
    },
}

/// Main error type for Printlink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a job state error
    pub fn is_job_error(&self) -> bool {
        matches!(self, Error::Job(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_name_the_port() {
        let err: Error = ConnectionError::PermissionDenied {
            port: "/dev/ttyACM0".into(),
        }
        .into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Permission denied opening /dev/ttyACM0");
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
