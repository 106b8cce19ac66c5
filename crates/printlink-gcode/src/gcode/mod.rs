//! G-Code parser and machine model
//!
//! This module provides:
//! - Line parsing into structured commands
//! - The machine state interpreter
//! - Layer, duration and bounds analysis
//! - The analyzed document

pub mod analyzer;
pub mod command;
pub mod document;
pub mod machine;
pub mod parser;

pub use analyzer::*;
pub use command::*;
pub use document::*;
pub use machine::*;
pub use parser::*;
