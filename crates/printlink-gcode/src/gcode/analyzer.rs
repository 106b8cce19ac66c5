//! Layer detection, print-time estimation and bounding boxes
//!
//! Layer detection is a heuristic. The typical layer height is guessed from the
//! first three distinct Z heights; a Z change smaller than that guess stays on
//! the current layer so travel Z-hops do not split layers.

use printlink_settings::MachineSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::command::{Command, CommandKind, MoveAnnotation};
use super::machine::MachineState;

/// Tolerance used until a layer height has been inferred
pub const DEFAULT_LAYER_TOLERANCE: f64 = 0.01;

const LAYER_EPSILON: f64 = 1e-4;

/// Analyzer tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Acceleration for the duration model, mm/s²
    pub acceleration: f64,
    /// Known layer height; skips inference when set
    pub layer_height: Option<f64>,
    /// Home position X/Y/Z, mm
    pub home: [f64; 3],
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            acceleration: 1500.0,
            layer_height: None,
            home: [0.0; 3],
        }
    }
}

impl From<&MachineSettings> for AnalyzerConfig {
    fn from(settings: &MachineSettings) -> Self {
        Self {
            acceleration: settings.acceleration,
            layer_height: settings.layer_height,
            home: settings.home,
        }
    }
}

/// Where a Z move puts the command relative to the open layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPlacement {
    /// Stays on the open layer
    Same,
    /// The open layer had no height; it takes this one
    Adopt,
    /// Opens a new layer
    New,
}

/// Infers the layer height and places Z moves
#[derive(Debug, Clone, Default)]
pub struct LayerTracker {
    distinct: BTreeSet<i64>,
    learned: Option<f64>,
    explicit: Option<f64>,
}

impl LayerTracker {
    /// Tracker with an optional known layer height
    pub fn new(explicit: Option<f64>) -> Self {
        Self {
            explicit,
            ..Self::default()
        }
    }

    /// Tolerance currently in effect
    pub fn tolerance(&self) -> f64 {
        self.explicit
            .or(self.learned)
            .unwrap_or(DEFAULT_LAYER_TOLERANCE)
    }

    /// Inferred layer height, once three distinct heights were seen
    pub fn learned_height(&self) -> Option<f64> {
        self.learned
    }

    /// Record `z` and decide its layer against the open layer's height
    pub fn place(&mut self, open_z: Option<f64>, z: f64) -> LayerPlacement {
        self.observe(z);
        match open_z {
            None => LayerPlacement::Adopt,
            Some(layer_z) if (z - layer_z).abs() >= self.tolerance() - LAYER_EPSILON => {
                LayerPlacement::New
            }
            Some(_) => LayerPlacement::Same,
        }
    }

    fn observe(&mut self, z: f64) {
        self.distinct.insert((z * 1000.0).round() as i64);
        if self.learned.is_some() || self.distinct.len() < 3 {
            return;
        }

        let heights: Vec<i64> = self.distinct.iter().copied().collect();
        let mut deltas: Vec<i64> = heights
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|d| *d > 0)
            .collect();
        deltas.sort_unstable();

        // second smallest, so one odd first layer does not set the height
        let pick = deltas.get(1).or_else(|| deltas.first());
        self.learned = pick.map(|d| *d as f64 / 1000.0);
    }
}

/// Constant-acceleration print-time model
#[derive(Debug, Clone)]
pub struct DurationEstimator {
    acceleration: f64,
    last_feed: f64,
    last_direction: (f64, f64),
}

impl DurationEstimator {
    /// Estimator with `acceleration` in mm/s²
    pub fn new(acceleration: f64) -> Self {
        Self {
            acceleration,
            last_feed: 0.0,
            last_direction: (0.0, 0.0),
        }
    }

    /// Seconds spent on `cmd`, moving from `before` to `after`
    pub fn estimate(&mut self, before: &MachineState, after: &MachineState, cmd: &Command) -> f64 {
        if cmd.is_passive() {
            return 0.0;
        }
        match cmd.kind() {
            CommandKind::Dwell => dwell_seconds(cmd),
            kind if kind.is_motion() => self.move_seconds(before, after, cmd),
            _ => 0.0,
        }
    }

    fn move_seconds(&mut self, before: &MachineState, after: &MachineState, cmd: &Command) -> f64 {
        let dx = after.position[0] - before.position[0];
        let dy = after.position[1] - before.position[1];
        let dz = after.position[2] - before.position[2];
        let de = after.extrusion - before.extrusion;

        let mut last_feed = self.last_feed;
        if dx * self.last_direction.0 + dy * self.last_direction.1 <= 0.0 {
            last_feed = 0.0;
        }
        if dx != 0.0 || dy != 0.0 {
            self.last_direction = (dx, dy);
        }

        let mut travel = match cmd.kind() {
            CommandKind::ArcClockwise | CommandKind::ArcCounterClockwise => {
                arc_length(before, after, cmd)
            }
            _ => dx.hypot(dy),
        };
        if travel == 0.0 {
            travel = if dz != 0.0 { dz.abs() } else { de.abs() };
        }

        let feed = after.feed_rate / 60.0;
        self.last_feed = feed;
        if feed <= 0.0 || travel == 0.0 {
            return 0.0;
        }

        if feed == last_feed {
            return travel / feed;
        }

        let distance =
            2.0 * ((last_feed + feed) * (feed - last_feed) * 0.5 / self.acceleration).abs();
        if distance <= travel {
            2.0 * distance / (last_feed + feed) + (travel - distance) / feed
        } else {
            2.0 * travel / (last_feed + feed)
        }
    }
}

fn dwell_seconds(cmd: &Command) -> f64 {
    match (cmd.value('P'), cmd.value('S')) {
        (Some(ms), _) => ms.max(0.0) / 1000.0,
        (None, Some(s)) => s.max(0.0),
        (None, None) => 0.0,
    }
}

/// XY length of a G2/G3 arc around `before + (I, J)`; chord when no center is given
fn arc_length(before: &MachineState, after: &MachineState, cmd: &Command) -> f64 {
    let scale = before.units.to_mm_factor();
    let (Some(i), Some(j)) = (cmd.value('I'), cmd.value('J')) else {
        let dx = after.position[0] - before.position[0];
        let dy = after.position[1] - before.position[1];
        return dx.hypot(dy);
    };
    let (cx, cy) = (before.position[0] + i * scale, before.position[1] + j * scale);
    let start = (before.position[0] - cx, before.position[1] - cy);
    let end = (after.position[0] - cx, after.position[1] - cy);
    let radius = start.0.hypot(start.1);

    let mut sweep = end.1.atan2(end.0) - start.1.atan2(start.0);
    let clockwise = cmd.kind() == CommandKind::ArcClockwise;
    if clockwise && sweep >= 0.0 {
        sweep -= std::f64::consts::TAU;
    } else if !clockwise && sweep <= 0.0 {
        sweep += std::f64::consts::TAU;
    }
    radius * sweep.abs()
}

/// Axis-aligned bounds, X/Y/Z
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner
    pub min: [f64; 3],
    /// Maximum corner
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Degenerate box around one point
    pub fn at(point: [f64; 3]) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Grow to contain `point`
    pub fn include(&mut self, point: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    /// Size along each axis
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Extruding-only and all-moves bounds, grown one interpreted move at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Extruding moves, both segment ends
    pub extruding: Option<BoundingBox>,
    /// End point of every move
    pub all_moves: Option<BoundingBox>,
}

impl Bounds {
    /// Account for one move from `before` with its annotation
    pub fn observe(&mut self, before: &MachineState, annotation: &MoveAnnotation) {
        let end = [annotation.x, annotation.y, annotation.z];
        grow(&mut self.all_moves, end);
        if annotation.extruding {
            grow(&mut self.extruding, before.position);
            grow(&mut self.extruding, end);
        }
    }
}

fn grow(slot: &mut Option<BoundingBox>, point: [f64; 3]) {
    match slot {
        Some(bbox) => bbox.include(point),
        None => *slot = Some(BoundingBox::at(point)),
    }
}
