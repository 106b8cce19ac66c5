//! Event system for print host communication
//!
//! Provides:
//! - Event types for link, job and controller report changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{JobPhase, PositionReport, TemperatureReport};
use tokio::sync::broadcast;

/// Print host event types
#[derive(Debug, Clone)]
pub enum PrintEvent {
    /// Handshake completed
    Online,
    /// Link closed, by request or by failure
    Disconnected,
    /// A line was written to the controller (wire text without newline)
    LineSent(String),
    /// A line was read from the controller
    LineReceived(String),
    /// Temperature report received
    Temperature(TemperatureReport),
    /// Position report received
    Position(PositionReport),
    /// Print loop started
    PrintStarted {
        /// True when continuing a paused job
        resume: bool,
    },
    /// Print loop exited
    PrintEnded,
    /// Main queue crossed into a new layer
    LayerChanged(usize),
    /// Job phase changed
    PhaseChanged(JobPhase),
    /// Error reported by the controller or the link
    Error(String),
}

impl std::fmt::Display for PrintEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrintEvent::Online => write!(f, "Online"),
            PrintEvent::Disconnected => write!(f, "Disconnected"),
            PrintEvent::LineSent(line) => write!(f, "SENT: {}", line),
            PrintEvent::LineReceived(line) => write!(f, "RECV: {}", line),
            PrintEvent::Temperature(report) => write!(f, "Temperature: {}", report),
            PrintEvent::Position(p) => write!(
                f,
                "Position: X:{:?} Y:{:?} Z:{:?} E:{:?}",
                p.x, p.y, p.z, p.e
            ),
            PrintEvent::PrintStarted { resume } => {
                if *resume {
                    write!(f, "Print resumed")
                } else {
                    write!(f, "Print started")
                }
            }
            PrintEvent::PrintEnded => write!(f, "Print ended"),
            PrintEvent::LayerChanged(layer) => write!(f, "Layer {}", layer),
            PrintEvent::PhaseChanged(phase) => write!(f, "Phase: {}", phase),
            PrintEvent::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for print events.
    tx: broadcast::Sender<PrintEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PrintEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers; zero when nobody is subscribed.
    pub fn publish(&self, event: PrintEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.publish(PrintEvent::Online), 0);
    }

    #[test]
    fn subscribers_receive_events() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);
        dispatcher.publish(PrintEvent::LayerChanged(3));
        match rx.try_recv() {
            Ok(PrintEvent::LayerChanged(3)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(
            PrintEvent::PrintStarted { resume: true }.to_string(),
            "Print resumed"
        );
        assert_eq!(PrintEvent::LineSent("G28".into()).to_string(), "SENT: G28");
    }
}
