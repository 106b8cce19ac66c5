//! # Printlink Communication
//!
//! Transports and the streaming protocol for Printlink.
//! Supports Serial/USB and TCP/IP links. The [`HostController`] handshakes
//! with the controller, streams checksummed, line-numbered G-code under a
//! one-line-in-flight credit, replays lines on resend requests and handles
//! pause, resume, cancel and recovery after a lost link.

pub mod communication;
pub mod protocol;

pub use communication::{
    connect, list_ports, LineBuffer, SerialPortInfo, SerialTransport, TcpTransport, Transport,
    TransportAddress, TransportKind, TransportOptions,
};

pub use protocol::{
    DirectiveHandler, HostController, JobProgress, JobState, LineOrigin, PauseSnapshot,
    PrintListener, RecoverySnapshot, Response, ResponseParser, Step, StreamConfig,
    PAUSE_DIRECTIVE,
};
