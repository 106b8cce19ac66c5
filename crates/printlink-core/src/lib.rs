//! # Printlink Core
//!
//! Core types, traits, and utilities for Printlink.
//! Provides errors, units, controller report models, listener
//! registration and the event dispatcher.

pub mod core;
pub mod data;
pub mod error;
pub mod units;

pub use self::core::{EventDispatcher, ListenerHandle, ListenerRegistry, PrintEvent};

pub use data::{JobPhase, PositionReport, TemperatureReading, TemperatureReport};

pub use error::{
    ConnectionError, Error, GcodeError, JobError, ProtocolError, Result, TransportError,
};

pub use units::{format_coordinate, MeasurementSystem, MM_PER_INCH};
