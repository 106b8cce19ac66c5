//! Data models reported by a connected controller
//!
//! This module provides:
//! - Temperature reports (hotends and bed, with optional setpoints)
//! - Position reports (`X:.. Y:.. Z:.. E:..`)
//! - The print job phase

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single temperature sensor reading, e.g. `T0:205.1 /210.0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Sensor label as reported (`T`, `T0`, `T1`, `B`)
    pub sensor: String,
    /// Measured temperature in degrees Celsius
    pub current: f64,
    /// Setpoint, when the firmware reports one
    pub target: Option<f64>,
}

impl TemperatureReading {
    /// Whether the reading belongs to the heated bed
    pub fn is_bed(&self) -> bool {
        self.sensor.starts_with('B')
    }
}

/// All temperature readings found on one received line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReport {
    /// Readings in the order they appeared on the line
    pub readings: Vec<TemperatureReading>,
}

impl TemperatureReport {
    /// True when the line carried no readings
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Look up a reading by sensor label
    pub fn sensor(&self, label: &str) -> Option<&TemperatureReading> {
        self.readings.iter().find(|r| r.sensor == label)
    }

    /// Bed reading, if reported
    pub fn bed(&self) -> Option<&TemperatureReading> {
        self.readings.iter().find(|r| r.is_bed())
    }
}

impl fmt::Display for TemperatureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for reading in &self.readings {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}:{:.1}", reading.sensor, reading.current)?;
            if let Some(target) = reading.target {
                write!(f, "/{:.1}", target)?;
            }
        }
        Ok(())
    }
}

/// Axis positions reported by the controller (`M114` style)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// X-axis position
    pub x: Option<f64>,
    /// Y-axis position
    pub y: Option<f64>,
    /// Z-axis position
    pub z: Option<f64>,
    /// Extruder position
    pub e: Option<f64>,
}

/// Phase of the print job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobPhase {
    /// No job is active
    #[default]
    Idle,
    /// Main queue is being streamed
    Printing,
    /// Job suspended, resumable from the same queue index
    Paused,
    /// Link lost during a job; a snapshot is kept for `recover`
    Recoverable,
}

impl JobPhase {
    /// Printing or paused
    pub fn is_active(self) -> bool {
        matches!(self, Self::Printing | Self::Paused)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Printing => write!(f, "Printing"),
            Self::Paused => write!(f, "Paused"),
            Self::Recoverable => write!(f, "Recoverable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display_includes_targets() {
        let report = TemperatureReport {
            readings: vec![
                TemperatureReading {
                    sensor: "T0".into(),
                    current: 205.13,
                    target: Some(210.0),
                },
                TemperatureReading {
                    sensor: "B".into(),
                    current: 60.0,
                    target: None,
                },
            ],
        };
        assert_eq!(report.to_string(), "T0:205.1/210.0 B:60.0");
        assert_eq!(report.bed().map(|r| r.current), Some(60.0));
        assert!(report.sensor("T1").is_none());
    }

    #[test]
    fn active_phases() {
        assert!(JobPhase::Printing.is_active());
        assert!(JobPhase::Paused.is_active());
        assert!(!JobPhase::Recoverable.is_active());
        assert_eq!(JobPhase::default(), JobPhase::Idle);
    }
}
