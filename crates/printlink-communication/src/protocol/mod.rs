//! Line-numbered streaming protocol
//!
//! Framing, response classification, the job state machine and the
//! [`HostController`] that drives them over a [`Transport`](crate::Transport).

pub mod config;
pub mod controller;
pub mod credit;
pub mod framing;
pub mod job;
pub mod listener;
pub mod response;

pub use config::StreamConfig;
pub use controller::{DirectiveHandler, HostController, PAUSE_DIRECTIVE};
pub use credit::Credit;
pub use framing::{checksum, frame, reset_frame, split_frame, verify};
pub use job::{
    JobProgress, JobState, LineOrigin, Outgoing, PauseSnapshot, RecoverySnapshot, Step,
};
pub use listener::PrintListener;
pub use response::{parse_position, parse_temperature, Response, ResponseParser};
