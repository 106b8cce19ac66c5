//! Print listener callbacks
//!
//! Listeners are invoked on the controller's worker threads, never while an
//! internal lock is held. Every method has an empty default.

use printlink_core::{PositionReport, TemperatureReport};
use printlink_gcode::Command;

/// Observer of a [`HostController`](super::HostController)
pub trait PrintListener: Send + Sync {
    /// A line went out on the wire; `raw` is exactly what was written
    fn on_line_sent(&self, _raw: &str, _command: &Command) {}

    /// A line arrived from the controller
    fn on_line_received(&self, _line: &str) {}

    /// Temperatures were reported
    fn on_temperature(&self, _report: &TemperatureReport) {}

    /// A position report was received
    fn on_position(&self, _report: &PositionReport) {}

    /// The print loop started; `resume` is set when continuing a job
    fn on_print_start(&self, _resume: bool) {}

    /// The print loop stopped (completion, pause, cancel or link loss)
    fn on_print_end(&self) {}

    /// The first command of layer `layer` was sent
    fn on_layer_change(&self, _layer: usize) {}

    /// The firmware or the link reported an error
    fn on_error(&self, _message: &str) {}

    /// Handshake completed
    fn on_online(&self) {}

    /// Transport closed
    fn on_disconnected(&self) {}
}
