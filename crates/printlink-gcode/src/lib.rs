//! # Printlink G-Code
//!
//! G-code parsing and analysis for Printlink.
//! Includes the line parser, the machine state interpreter, layer and
//! print-time analysis and the [`Document`] model streamed by the host.

pub mod gcode;
pub mod utils;

pub use gcode::{
    parse_line, AnalyzerConfig, BoundingBox, Bounds, Command, CommandKind, Document,
    DurationEstimator, Layer, LayerPlacement, LayerTracker, LineParser, MachineState,
    MoveAnnotation, Word, DEFAULT_LAYER_TOLERANCE, DIRECTIVE_MARKER, RECOGNIZED_LETTERS,
};

pub use utils::{FileEncoding, FileReadStats, GcodeFileReader};
