//! Runtime configuration of the streaming host

use std::time::Duration;

use printlink_settings::Config;

use crate::communication::TransportOptions;

/// Tuning for handshake, flow control and pause/resume
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Bounded wait for one received line
    pub read_timeout: Duration,
    /// Re-check interval for every blocking wait
    pub poll_interval: Duration,
    /// Empty reads before the handshake poll is repeated
    pub handshake_empty_reads: u32,
    /// Polls before the handshake gives up
    pub handshake_attempts: u32,
    /// Consecutive write failures that end the connection
    pub write_failure_limit: u32,
    /// Boot banners, matched as prefixes
    pub greetings: Vec<String>,
    /// Skip acknowledgement waits on TCP
    pub tcp_streaming: bool,
    /// Command sent to provoke a reply during the handshake
    pub status_poll_command: String,
    /// Commands queued on pause
    pub on_pause_script: Vec<String>,
    /// Feed for the XY return move on resume
    pub resume_xy_feed: Option<f64>,
    /// Feed for the Z return move on resume
    pub resume_z_feed: Option<f64>,
    /// Home position of the sent-side machine model
    pub home: [f64; 3],
    /// How transports are opened by [`HostController::connect`](super::HostController::connect)
    pub transport: TransportOptions,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StreamConfig {
    fn from(config: &Config) -> Self {
        let streaming = &config.streaming;
        Self {
            read_timeout: Duration::from_millis(config.connection.read_timeout_ms),
            poll_interval: Duration::from_millis(streaming.poll_interval_ms),
            handshake_empty_reads: streaming.handshake_empty_reads,
            handshake_attempts: streaming.handshake_attempts,
            write_failure_limit: streaming.write_failure_limit,
            greetings: streaming.greetings.clone(),
            tcp_streaming: streaming.tcp_streaming,
            status_poll_command: streaming.status_poll_command.clone(),
            on_pause_script: config.pause.on_pause_script.clone(),
            resume_xy_feed: config.pause.xy_feed,
            resume_z_feed: config.pause.z_feed,
            home: config.machine.home,
            transport: TransportOptions::from(&config.connection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let config = StreamConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.handshake_empty_reads, 15);
        assert_eq!(config.handshake_attempts, 20);
        assert_eq!(config.write_failure_limit, 4);
        assert_eq!(config.status_poll_command, "M105");
        assert!(config.transport.restore_hangup);
    }

    #[test]
    fn pause_section_is_carried() {
        let mut settings = Config::default();
        settings.pause.on_pause_script = vec!["G91".into(), "G1 Z5".into(), "G90".into()];
        settings.pause.xy_feed = Some(6000.0);
        settings.connection.restore_hangup_on_disconnect = false;

        let config = StreamConfig::from(&settings);
        assert_eq!(config.on_pause_script.len(), 3);
        assert_eq!(config.resume_xy_feed, Some(6000.0));
        assert_eq!(config.resume_z_feed, None);
        assert!(!config.transport.restore_hangup);
    }
}
