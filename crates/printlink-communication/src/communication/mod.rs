//! Byte transports to the controller
//!
//! A [`Transport`] moves text lines over a serial device or a TCP socket.
//! Reads and writes use separate locks so the reader loop and the sending
//! loops never wait on each other.

pub mod serial;
pub mod tcp;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use printlink_core::{ConnectionError, TransportError};
use printlink_settings::ConnectionSettings;

pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use tcp::TcpTransport;

/// Which kind of link a transport drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Serial / USB device
    Serial,
    /// TCP socket
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Line-oriented link to the controller
pub trait Transport: Send + Sync {
    /// Read one line, waiting at most `timeout`.
    ///
    /// `Ok(None)` means nothing arrived in time. Line endings are stripped.
    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError>;

    /// Write all bytes
    fn write_all(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the link. Later reads and writes fail with [`TransportError::Closed`].
    fn close(&self) -> Result<(), TransportError>;

    /// Link kind
    fn kind(&self) -> TransportKind;

    /// Human readable endpoint name
    fn name(&self) -> String;

    /// Hardware reset of the controller, where the link supports one
    fn reset(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Parsed connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAddress {
    /// Serial device path or port name
    Serial(String),
    /// Network endpoint
    Tcp {
        /// Host name or address literal
        host: String,
        /// TCP port
        port: u16,
    },
}

impl TransportAddress {
    /// Decide between serial and TCP.
    ///
    /// The address is TCP when the text after its last `:` is a valid port
    /// number and the host part is non-empty. Everything else is a device path.
    pub fn parse(address: &str) -> Result<Self, ConnectionError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ConnectionError::InvalidAddress {
                address: address.to_string(),
            });
        }

        if let Some((host, port)) = address.rsplit_once(':') {
            if let (false, Ok(port)) = (host.is_empty(), port.parse::<u16>()) {
                return Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                });
            }
        }

        Ok(Self::Serial(address.to_string()))
    }

    /// Transport kind this address selects
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial(_) => TransportKind::Serial,
            Self::Tcp { .. } => TransportKind::Tcp,
        }
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(path) => write!(f, "{}", path),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Options that shape how a transport is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Restore the serial hang-up-on-close flag when the port is closed
    pub restore_hangup: bool,
    /// Timeout for establishing a TCP connection
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            restore_hangup: true,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ConnectionSettings> for TransportOptions {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            restore_hangup: settings.restore_hangup_on_disconnect,
            ..Self::default()
        }
    }
}

/// Open the transport `address` names
pub fn connect(
    address: &str,
    baud_rate: u32,
    options: &TransportOptions,
) -> Result<Arc<dyn Transport>, ConnectionError> {
    match TransportAddress::parse(address)? {
        TransportAddress::Serial(path) => {
            let transport = SerialTransport::open(&path, baud_rate, options.restore_hangup)?;
            Ok(Arc::new(transport))
        }
        TransportAddress::Tcp { host, port } => {
            let transport = TcpTransport::connect(&host, port, options.connect_timeout)?;
            Ok(Arc::new(transport))
        }
    }
}

/// Unterminated bytes held before they are handed out as a line anyway
pub const MAX_LINE_LENGTH: usize = 4096;

/// Pause after a zero-length read on a link where that is not end of stream
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(5);

/// Accumulates raw bytes and hands out complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, without its `\n` or `\r\n`.
    ///
    /// Past [`MAX_LINE_LENGTH`] unterminated bytes the whole tail is
    /// returned as one line.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            if self.pending.len() < MAX_LINE_LENGTH {
                return None;
            }
            tracing::warn!(
                "No line terminator in {} bytes; wrong baud rate?",
                self.pending.len()
            );
            let line = std::mem::take(&mut self.pending);
            return Some(String::from_utf8_lossy(&line).into_owned());
        };
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line[..end]);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Bytes held without a line terminator yet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop buffered bytes
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Shared read loop for stream transports.
///
/// `read_chunk` gets the remaining wait and must return `TimedOut` or
/// `WouldBlock` when nothing arrives. A zero-length read is end of stream
/// when `zero_is_eof` is set and otherwise treated as an empty poll.
pub(crate) fn read_line_with<F>(
    buffer: &mut LineBuffer,
    timeout: Duration,
    zero_is_eof: bool,
    mut read_chunk: F,
) -> Result<Option<String>, TransportError>
where
    F: FnMut(&mut [u8], Duration) -> io::Result<usize>,
{
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; 512];

    loop {
        if let Some(line) = buffer.next_line() {
            return Ok(Some(line));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        match read_chunk(&mut chunk, remaining) {
            Ok(0) if zero_is_eof => return Err(TransportError::Eof),
            Ok(0) => thread::sleep(remaining.min(EMPTY_READ_BACKOFF)),
            Ok(n) => buffer.push(&chunk[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(TransportError::Read {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_classification() {
        assert_eq!(
            TransportAddress::parse("printer.local:23").unwrap(),
            TransportAddress::Tcp {
                host: "printer.local".to_string(),
                port: 23
            }
        );
        assert_eq!(
            TransportAddress::parse("/dev/ttyUSB0").unwrap(),
            TransportAddress::Serial("/dev/ttyUSB0".to_string())
        );
        assert_eq!(
            TransportAddress::parse("COM3").unwrap().kind(),
            TransportKind::Serial
        );
        // Colon in a device path with a non-numeric tail
        assert_eq!(
            TransportAddress::parse("/dev/serial/by-id/usb-Prusa:if00").unwrap().kind(),
            TransportKind::Serial
        );
        assert_eq!(
            TransportAddress::parse(":8080").unwrap().kind(),
            TransportKind::Serial
        );
        assert_eq!(
            TransportAddress::parse("host:99999").unwrap().kind(),
            TransportKind::Serial
        );
        assert!(TransportAddress::parse("   ").is_err());
    }

    #[test]
    fn ipv6_literal_round_trips_through_display() {
        let addr = TransportAddress::parse("[::1]:2323").unwrap();
        assert_eq!(addr.to_string(), "[::1]:2323");
    }

    #[test]
    fn line_buffer_splits_and_keeps_partial_tail() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"ok\r\nT:20");
        assert_eq!(buffer.next_line().as_deref(), Some("ok"));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.pending_len(), 4);
        buffer.push(b".0\n");
        assert_eq!(buffer.next_line().as_deref(), Some("T:20.0"));
    }

    #[test]
    fn read_loop_times_out_and_reports_eof() {
        let mut buffer = LineBuffer::new();
        let result = read_line_with(&mut buffer, Duration::from_millis(5), true, |_, _| {
            Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
        });
        assert!(matches!(result, Ok(None)));

        let result = read_line_with(&mut buffer, Duration::from_millis(5), true, |_, _| Ok(0));
        assert!(matches!(result, Err(TransportError::Eof)));
    }

    #[test]
    fn unterminated_input_is_cut_into_lines() {
        let mut buffer = LineBuffer::new();
        buffer.push(&[b'~'; MAX_LINE_LENGTH - 1]);
        assert_eq!(buffer.next_line(), None);
        buffer.push(b"~");
        assert_eq!(buffer.next_line().map(|l| l.len()), Some(MAX_LINE_LENGTH));
        assert_eq!(buffer.pending_len(), 0);
        buffer.push(b"ok\n");
        assert_eq!(buffer.next_line().as_deref(), Some("ok"));
    }

    #[test]
    fn zero_reads_back_off_until_timeout() {
        let mut buffer = LineBuffer::new();
        let mut calls = 0;
        let result = read_line_with(&mut buffer, Duration::from_millis(20), false, |_, _| {
            calls += 1;
            Ok(0)
        });
        assert!(matches!(result, Ok(None)));
        assert!(calls <= 6, "{} reads", calls);
    }

    #[test]
    fn read_loop_assembles_chunks() {
        let mut buffer = LineBuffer::new();
        let mut parts = vec![b"k\n".to_vec(), b"o".to_vec()];
        let line = read_line_with(&mut buffer, Duration::from_secs(1), true, |buf, _| {
            let part = parts.pop().unwrap_or_default();
            buf[..part.len()].copy_from_slice(&part);
            Ok(part.len())
        })
        .unwrap();
        assert_eq!(line.as_deref(), Some("ok"));
    }
}
