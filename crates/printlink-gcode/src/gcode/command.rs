//! G-Code command types
//!
//! A [`Command`] is one parsed source line. The raw text never changes after
//! parsing; the [`MoveAnnotation`] is attached once, by the machine model walker
//! that interprets the command.

use serde::{Deserialize, Serialize};

/// Letters with structured meaning
pub const RECOGNIZED_LETTERS: [char; 13] = [
    'G', 'M', 'T', 'N', 'X', 'Y', 'Z', 'E', 'F', 'I', 'J', 'P', 'S',
];

/// One letter/number pair, e.g. `X10.5`.
///
/// `value` is `None` for a bare letter such as the axes in `G28 X Y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Upper-case letter
    pub letter: char,
    /// Numeric argument, absent for a bare letter
    pub value: Option<f64>,
}

/// What a command does, resolved from its mnemonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// G0
    Rapid,
    /// G1
    Linear,
    /// G2
    ArcClockwise,
    /// G3
    ArcCounterClockwise,
    /// G4
    Dwell,
    /// G20
    UnitsInches,
    /// G21
    UnitsMillimeters,
    /// G28
    Home,
    /// G90
    AbsolutePositioning,
    /// G91
    RelativePositioning,
    /// G92
    SetPosition,
    /// M82
    AbsoluteExtrusion,
    /// M83
    RelativeExtrusion,
    /// T<n>
    SelectTool(u32),
    /// Any other mnemonic; sent as-is, no effect on the machine model
    Passthrough,
    /// Comment-only, empty or argument-only line
    NoCommand,
}

impl CommandKind {
    /// Resolve a normalized mnemonic such as `G1` or `T0`
    pub fn from_mnemonic(mnemonic: Option<&str>) -> Self {
        let Some(mnemonic) = mnemonic else {
            return Self::NoCommand;
        };
        match mnemonic {
            "G0" => Self::Rapid,
            "G1" => Self::Linear,
            "G2" => Self::ArcClockwise,
            "G3" => Self::ArcCounterClockwise,
            "G4" => Self::Dwell,
            "G20" => Self::UnitsInches,
            "G21" => Self::UnitsMillimeters,
            "G28" => Self::Home,
            "G90" => Self::AbsolutePositioning,
            "G91" => Self::RelativePositioning,
            "G92" => Self::SetPosition,
            "M82" => Self::AbsoluteExtrusion,
            "M83" => Self::RelativeExtrusion,
            other => match other.strip_prefix('T').map(str::parse::<u32>) {
                Some(Ok(tool)) => Self::SelectTool(tool),
                _ => Self::Passthrough,
            },
        }
    }

    /// G0 through G3
    pub fn is_motion(self) -> bool {
        matches!(
            self,
            Self::Rapid | Self::Linear | Self::ArcClockwise | Self::ArcCounterClockwise
        )
    }
}

/// Derived fields written when a move is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveAnnotation {
    /// Positional relative mode at interpretation time
    pub relative: bool,
    /// Extrusion relative mode at interpretation time
    pub relative_extrusion: bool,
    /// Active tool
    pub tool: u32,
    /// Machine X after the move, mm
    pub x: f64,
    /// Machine Y after the move, mm
    pub y: f64,
    /// Machine Z after the move, mm
    pub z: f64,
    /// Net positive extrusion on this move
    pub extruding: bool,
    /// Extrusion change on this move, mm of filament
    pub extrusion_delta: f64,
    /// Feed rate in effect, mm/min
    pub feed_rate: f64,
}

/// A parsed G-Code line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub(crate) raw: String,
    pub(crate) payload: String,
    pub(crate) mnemonic: Option<String>,
    pub(crate) kind: CommandKind,
    pub(crate) line_number: Option<u64>,
    pub(crate) words: Vec<Word>,
    pub(crate) directive: Option<String>,
    pub(crate) malformed: bool,
    pub(crate) passive: bool,
    pub(crate) annotation: Option<MoveAnnotation>,
}

impl Command {
    /// Parse a line. Never fails; see [`crate::parse_line`].
    pub fn parse(raw: &str) -> Self {
        super::parser::parse_line(raw)
    }

    /// Parse a line that must never be interpreted as a move
    pub fn passive(raw: &str) -> Self {
        let mut cmd = Self::parse(raw);
        cmd.passive = true;
        cmd
    }

    /// Source text exactly as given
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Comment-free text without line number or checksum; what goes on the wire
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Normalized mnemonic (`G1`, `M104`, `T0`, `G29.1`)
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    /// Resolved command kind
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// `N` word from the source line, if any
    pub fn line_number(&self) -> Option<u64> {
        self.line_number
    }

    /// Recognized words in source order
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Text after a `;@` marker
    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }

    /// Nothing tokenizable was found in a non-empty line
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Inserted by layer editing; never interpreted
    pub fn is_passive(&self) -> bool {
        self.passive
    }

    /// G0-G3 that is not passive
    pub fn is_move(&self) -> bool {
        self.kind.is_motion() && !self.passive
    }

    /// Nothing would be transmitted for this line
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First numeric value for `letter`
    pub fn value(&self, letter: char) -> Option<f64> {
        self.words
            .iter()
            .find(|w| w.letter == letter && w.value.is_some())
            .and_then(|w| w.value)
    }

    /// Letter present, with or without a value
    pub fn names(&self, letter: char) -> bool {
        self.words.iter().any(|w| w.letter == letter)
    }

    /// X value
    pub fn x(&self) -> Option<f64> {
        self.value('X')
    }

    /// Y value
    pub fn y(&self) -> Option<f64> {
        self.value('Y')
    }

    /// Z value
    pub fn z(&self) -> Option<f64> {
        self.value('Z')
    }

    /// E value
    pub fn e(&self) -> Option<f64> {
        self.value('E')
    }

    /// F value
    pub fn f(&self) -> Option<f64> {
        self.value('F')
    }

    /// Derived move fields, once interpreted
    pub fn annotation(&self) -> Option<&MoveAnnotation> {
        self.annotation.as_ref()
    }

    /// Machine X after interpretation
    pub fn current_x(&self) -> Option<f64> {
        self.annotation.map(|a| a.x)
    }

    /// Machine Y after interpretation
    pub fn current_y(&self) -> Option<f64> {
        self.annotation.map(|a| a.y)
    }

    /// Machine Z after interpretation
    pub fn current_z(&self) -> Option<f64> {
        self.annotation.map(|a| a.z)
    }

    /// Net positive extrusion, once interpreted
    pub fn extruding(&self) -> bool {
        self.annotation.is_some_and(|a| a.extruding)
    }

    pub(crate) fn annotate(&mut self, annotation: MoveAnnotation) {
        debug_assert!(
            self.annotation.is_none() || self.annotation == Some(annotation),
            "annotate called twice with different values on {:?}",
            self.raw
        );
        if self.annotation.is_none() {
            self.annotation = Some(annotation);
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
