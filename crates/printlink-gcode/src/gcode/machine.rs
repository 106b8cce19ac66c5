//! Machine model
//!
//! [`MachineState::step`] is the single interpretation rule set. The document
//! walker and the host's sent-side shadow both drive it, one command at a time.
//!
//! Positions are machine coordinates in millimeters. A field value `v` in
//! absolute mode lands at `v + offset`; `G92 v` sets `offset = position - v`,
//! so the controller's own coordinate for an axis is `position - offset`.

use printlink_core::units::MeasurementSystem;
use serde::{Deserialize, Serialize};

use super::command::{Command, CommandKind, MoveAnnotation};

const AXES: [char; 3] = ['X', 'Y', 'Z'];

/// Running model of the machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Active unit system
    pub units: MeasurementSystem,
    /// G91 in effect
    pub relative: bool,
    /// Extrusion relative (M83, or G91)
    pub relative_extrusion: bool,
    /// Selected tool
    pub tool: u32,
    /// Machine position X/Y/Z, mm
    pub position: [f64; 3],
    /// Coordinate offsets X/Y/Z, mm
    pub offset: [f64; 3],
    /// Position after homing X/Y/Z, mm
    pub home: [f64; 3],
    /// Total filament pushed, mm
    pub extrusion: f64,
    /// Extrusion offset set by `G92 E`
    pub extrusion_offset: f64,
    /// High-water mark of `extrusion`
    pub max_extrusion: f64,
    /// Feed rate, mm/min
    pub feed_rate: f64,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::with_home([0.0; 3])
    }
}

impl MachineState {
    /// Fresh state with the given home position; the machine starts there
    pub fn with_home(home: [f64; 3]) -> Self {
        Self {
            units: MeasurementSystem::Metric,
            relative: false,
            relative_extrusion: false,
            tool: 0,
            position: home,
            offset: [0.0; 3],
            home,
            extrusion: 0.0,
            extrusion_offset: 0.0,
            max_extrusion: 0.0,
            feed_rate: 0.0,
        }
    }

    /// Axis position as the controller sees it (`position - offset`)
    pub fn logical_position(&self) -> [f64; 3] {
        [
            self.position[0] - self.offset[0],
            self.position[1] - self.offset[1],
            self.position[2] - self.offset[2],
        ]
    }

    /// E coordinate as the controller sees it
    pub fn logical_extrusion(&self) -> f64 {
        self.extrusion - self.extrusion_offset
    }

    /// Interpret `cmd` without mutating `self`.
    ///
    /// Returns the next state and, for moves, the annotation to attach.
    /// Passive commands leave the state unchanged.
    pub fn step(&self, cmd: &Command) -> (MachineState, Option<MoveAnnotation>) {
        let mut next = *self;
        if cmd.is_passive() {
            return (next, None);
        }

        let scale = self.units.to_mm_factor();
        let scaled = |letter: char| cmd.value(letter).map(|v| v * scale);

        match cmd.kind() {
            CommandKind::UnitsInches => next.units = MeasurementSystem::Imperial,
            CommandKind::UnitsMillimeters => next.units = MeasurementSystem::Metric,
            CommandKind::AbsolutePositioning => {
                next.relative = false;
                next.relative_extrusion = false;
            }
            CommandKind::RelativePositioning => {
                next.relative = true;
                next.relative_extrusion = true;
            }
            CommandKind::AbsoluteExtrusion => next.relative_extrusion = false,
            CommandKind::RelativeExtrusion => next.relative_extrusion = true,
            CommandKind::SelectTool(tool) => next.tool = tool,
            CommandKind::SetPosition => {
                let any_named = AXES.iter().chain(['E'].iter()).any(|&l| cmd.value(l).is_some());
                for (i, &letter) in AXES.iter().enumerate() {
                    match scaled(letter) {
                        Some(v) => next.offset[i] = next.position[i] - v,
                        None if !any_named => next.offset[i] = next.position[i],
                        None => {}
                    }
                }
                match scaled('E') {
                    Some(v) => next.extrusion_offset = next.extrusion - v,
                    None if !any_named => next.extrusion_offset = next.extrusion,
                    None => {}
                }
            }
            CommandKind::Home => {
                let any_named = AXES.iter().any(|&l| cmd.names(l));
                for (i, &letter) in AXES.iter().enumerate() {
                    if !any_named || cmd.names(letter) {
                        next.offset[i] = 0.0;
                        next.position[i] = next.home[i];
                    }
                }
            }
            CommandKind::Rapid
            | CommandKind::Linear
            | CommandKind::ArcClockwise
            | CommandKind::ArcCounterClockwise => {
                for (i, &letter) in AXES.iter().enumerate() {
                    if let Some(v) = scaled(letter) {
                        next.position[i] = if self.relative {
                            self.position[i] + v
                        } else {
                            v + self.offset[i]
                        };
                    }
                }

                let mut delta = 0.0;
                if let Some(v) = scaled('E') {
                    delta = if self.relative_extrusion {
                        v
                    } else {
                        v + self.extrusion_offset - self.extrusion
                    };
                    next.extrusion += delta;
                    next.max_extrusion = next.max_extrusion.max(next.extrusion);
                }

                if let Some(f) = cmd.f() {
                    next.feed_rate = f;
                }

                let annotation = MoveAnnotation {
                    relative: self.relative,
                    relative_extrusion: self.relative_extrusion,
                    tool: self.tool,
                    x: next.position[0],
                    y: next.position[1],
                    z: next.position[2],
                    extruding: delta > 0.0,
                    extrusion_delta: delta,
                    feed_rate: next.feed_rate,
                };
                return (next, Some(annotation));
            }
            CommandKind::Dwell | CommandKind::Passthrough | CommandKind::NoCommand => {}
        }

        (next, None)
    }

    /// Interpret `cmd`, advance the state and return the annotated command
    pub fn interpret(&mut self, mut cmd: Command) -> Command {
        let (next, annotation) = self.step(&cmd);
        *self = next;
        if let Some(annotation) = annotation {
            cmd.annotate(annotation);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> MachineState {
        let mut state = MachineState::default();
        for line in lines {
            state.interpret(Command::parse(line));
        }
        state
    }

    #[test]
    fn relative_moves_accumulate() {
        let state = run(&["G91", "G1 X10 F1200", "G1 X-5"]);
        assert_eq!(state.position[0], 5.0);
        assert_eq!(state.feed_rate, 1200.0);
    }

    #[test]
    fn set_position_then_absolute_move_is_zero_length() {
        let mut state = run(&["G90", "G1 X42", "G92 X0"]);
        assert_eq!(state.offset[0], 42.0);
        let cmd = state.interpret(Command::parse("G1 X0"));
        assert_eq!(cmd.current_x(), Some(42.0));
        assert_eq!(state.logical_position()[0], 0.0);
    }

    #[test]
    fn imperial_scales_axes_but_not_feed() {
        let state = run(&["G20", "G1 X1 Y2 F100"]);
        assert!((state.position[0] - 25.4).abs() < 1e-9);
        assert!((state.position[1] - 50.8).abs() < 1e-9);
        assert_eq!(state.feed_rate, 100.0);
    }

    #[test]
    fn extrusion_relativity_is_independent() {
        let state = run(&["G90", "M83", "G1 X10 E1", "G1 X20 E1"]);
        assert!(!state.relative);
        assert!(state.relative_extrusion);
        assert_eq!(state.extrusion, 2.0);
        assert_eq!(state.position[0], 20.0);
    }

    #[test]
    fn g91_also_makes_extrusion_relative() {
        let state = run(&["G91"]);
        assert!(state.relative_extrusion);
        let state = run(&["G91", "M82"]);
        assert!(state.relative && !state.relative_extrusion);
    }

    #[test]
    fn retraction_is_not_extruding() {
        let mut state = run(&["G1 E5"]);
        let cmd = state.interpret(Command::parse("G1 E4"));
        let ann = cmd.annotation().unwrap();
        assert!(!ann.extruding);
        assert_eq!(ann.extrusion_delta, -1.0);
        assert_eq!(state.max_extrusion, 5.0);
    }

    #[test]
    fn set_position_e_redefines_extrusion_offset() {
        let state = run(&["G1 E10", "G92 E0", "G1 E2"]);
        assert_eq!(state.extrusion, 12.0);
        assert_eq!(state.logical_extrusion(), 2.0);
    }

    #[test]
    fn home_resets_named_axes() {
        let mut state = MachineState::with_home([1.0, 2.0, 3.0]);
        for line in ["G1 X50 Y50 Z50", "G92 Z0", "G28 X"] {
            state.interpret(Command::parse(line));
        }
        assert_eq!(state.position, [1.0, 50.0, 50.0]);
        assert_eq!(state.offset[2], 50.0);

        state.interpret(Command::parse("G28"));
        assert_eq!(state.position, [1.0, 2.0, 3.0]);
        assert_eq!(state.offset, [0.0; 3]);
    }

    #[test]
    fn tool_select_is_recorded() {
        let mut state = run(&["T1"]);
        let cmd = state.interpret(Command::parse("G1 X1"));
        assert_eq!(cmd.annotation().unwrap().tool, 1);
    }

    #[test]
    fn passive_commands_do_not_move() {
        let mut state = MachineState::default();
        let cmd = state.interpret(Command::passive("G1 X99"));
        assert!(cmd.annotation().is_none());
        assert_eq!(state.position[0], 0.0);
    }

    #[test]
    fn step_is_pure() {
        let state = run(&["G1 X3"]);
        let before = state;
        let (next, _) = state.step(&Command::parse("G1 X9"));
        assert_eq!(state, before);
        assert_eq!(next.position[0], 9.0);
    }
}
