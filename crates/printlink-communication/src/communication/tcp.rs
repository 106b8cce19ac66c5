//! TCP transport for network-attached controllers and serial bridges

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use printlink_core::{ConnectionError, TransportError};

use super::{read_line_with, LineBuffer, Transport, TransportKind};

struct ReadSide {
    stream: TcpStream,
    buffer: LineBuffer,
}

/// TCP socket transport
pub struct TcpTransport {
    peer: String,
    reader: Mutex<ReadSide>,
    writer: Mutex<TcpStream>,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Resolve `host` and connect with `timeout`
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ConnectionError> {
        let peer = format!("{}:{}", host, port);
        let addr = resolve(&peer, host)?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            tracing::warn!("Failed to connect to {}: {}", peer, e);
            ConnectionError::TcpError {
                reason: format!("{}: {}", peer, e),
            }
        })?;
        Self::from_stream(stream, peer)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, peer: String) -> Result<Self, ConnectionError> {
        let tcp_error = |e: std::io::Error| ConnectionError::TcpError {
            reason: e.to_string(),
        };
        stream.set_nodelay(true).map_err(tcp_error)?;
        let read_stream = stream.try_clone().map_err(tcp_error)?;

        tracing::info!("Connected to {}", peer);
        Ok(Self {
            peer,
            reader: Mutex::new(ReadSide {
                stream: read_stream,
                buffer: LineBuffer::new(),
            }),
            writer: Mutex::new(stream),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

fn resolve(peer: &str, host: &str) -> Result<SocketAddr, ConnectionError> {
    peer.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConnectionError::HostnameResolution {
            hostname: host.to_string(),
        })
}

impl Transport for TcpTransport {
    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        self.ensure_open()?;
        let mut side = self.reader.lock();
        let ReadSide { stream, buffer } = &mut *side;
        read_line_with(buffer, timeout, true, |chunk, remaining| {
            stream.set_read_timeout(Some(remaining))?;
            stream.read(chunk)
        })
    }

    fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut stream = self.writer.lock();
        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let stream = self.writer.lock();
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            // Peer already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
            Err(e) => {
                return Err(TransportError::Write {
                    reason: e.to_string(),
                })
            }
        }
        tracing::info!("Closed connection to {}", self.peer);
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn name(&self) -> String {
        self.peer.clone()
    }
}
