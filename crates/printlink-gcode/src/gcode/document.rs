//! Analyzed G-Code document
//!
//! A [`Document`] owns its layers and commands. Commands are interpreted in
//! insertion order as they are appended, so loading and streaming edits share
//! one code path.

use printlink_core::GcodeError;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::analyzer::{
    AnalyzerConfig, BoundingBox, Bounds, DurationEstimator, LayerPlacement, LayerTracker,
};
use super::command::Command;
use super::machine::MachineState;
use crate::utils::file_io::GcodeFileReader;

/// Commands believed to share one print height
#[derive(Debug, Clone, Default)]
pub struct Layer {
    z: Option<f64>,
    commands: Vec<Command>,
    durations: Vec<f64>,
}

impl Layer {
    fn new(z: Option<f64>) -> Self {
        Self {
            z,
            ..Self::default()
        }
    }

    /// Representative height, if one has been seen
    pub fn z(&self) -> Option<f64> {
        self.z
    }

    /// Commands in execution order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when the layer has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Estimated time for the layer
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.durations.iter().sum::<f64>())
    }

    fn push(&mut self, command: Command, seconds: f64) {
        self.commands.push(command);
        self.durations.push(seconds);
    }
}

/// Ordered, layered and analyzed G-Code
#[derive(Debug, Clone)]
pub struct Document {
    config: AnalyzerConfig,
    layers: Vec<Layer>,
    index: Vec<(usize, usize)>,
    cumulative: Vec<f64>,
    bounds: Bounds,
    filament_per_tool: BTreeMap<u32, f64>,
    state: MachineState,
    tracker: LayerTracker,
    estimator: DurationEstimator,
    malformed: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl Document {
    /// Empty document
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            layers: Vec::new(),
            index: Vec::new(),
            cumulative: Vec::new(),
            bounds: Bounds::default(),
            filament_per_tool: BTreeMap::new(),
            state: MachineState::with_home(config.home),
            tracker: LayerTracker::new(config.layer_height),
            estimator: DurationEstimator::new(config.acceleration),
            malformed: 0,
        }
    }

    /// Build a document from lines of text
    pub fn from_lines<I, S>(lines: I, config: AnalyzerConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut document = Self::new(config);
        for line in lines {
            document.append(line.as_ref());
        }
        document
    }

    /// Load a G-Code file
    pub fn load_file(path: impl AsRef<Path>, config: AnalyzerConfig) -> Result<Self, GcodeError> {
        let reader = GcodeFileReader::new(path)?;
        let mut document = Self::new(config);
        let stats = reader.read_lines(|line| {
            document.append(line);
            Ok(())
        })?;
        tracing::info!(
            "Loaded {} lines ({} layers) from {} in {}ms",
            stats.lines_read,
            document.layer_count(),
            reader.path().display(),
            stats.read_time_ms
        );
        Ok(document)
    }

    /// Analyzer settings used by this document
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Parse, interpret and append one line. Returns its global index.
    pub fn append(&mut self, raw: &str) -> usize {
        let command = Command::parse(raw);
        let global = self.index.len();
        if command.is_malformed() {
            self.malformed += 1;
            tracing::warn!("Untokenizable G-code at line {}: {}", global, raw.trim());
        }

        let before = self.state;
        let (after, annotation) = before.step(&command);
        let seconds = self.estimator.estimate(&before, &after, &command);
        self.state = after;

        let mut command = command;
        if let Some(annotation) = annotation {
            command.annotate(annotation);
            self.bounds.observe(&before, &annotation);
            if annotation.extrusion_delta > 0.0 {
                *self.filament_per_tool.entry(annotation.tool).or_insert(0.0) +=
                    annotation.extrusion_delta;
            }
        }

        if self.layers.is_empty() {
            self.layers.push(Layer::new(None));
        }
        if command.is_move() && command.z().is_some() {
            let z = after.position[2];
            let open = self.layers.len() - 1;
            match self.tracker.place(self.layers[open].z, z) {
                LayerPlacement::Same => {}
                LayerPlacement::Adopt => self.layers[open].z = Some(z),
                LayerPlacement::New => self.layers.push(Layer::new(Some(z))),
            }
        }

        let layer = self.layers.len() - 1;
        self.layers[layer].push(command, seconds);
        self.index.push((layer, self.layers[layer].len() - 1));
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        self.cumulative.push(total + seconds);
        global
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the document has no commands
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Command at a global index
    pub fn get(&self, index: usize) -> Option<&Command> {
        let (layer, position) = *self.index.get(index)?;
        self.layers.get(layer)?.commands.get(position)
    }

    /// `(layer, index within layer)` for a global index
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        self.index.get(index).copied()
    }

    /// Layer containing a global index
    pub fn layer_of(&self, index: usize) -> Option<usize> {
        self.locate(index).map(|(layer, _)| layer)
    }

    /// All commands in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.layers.iter().flat_map(|layer| layer.commands.iter())
    }

    /// Layers in order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// One layer
    pub fn layer(&self, layer: usize) -> Option<&Layer> {
        self.layers.get(layer)
    }

    /// Bounds of extruding moves
    pub fn extruding_bounds(&self) -> Option<BoundingBox> {
        self.bounds.extruding
    }

    /// Bounds of every move
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds.all_moves
    }

    /// Both bounding boxes
    pub fn all_bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Filament length: the extrusion high-water mark, mm
    pub fn filament_length(&self) -> f64 {
        self.state.max_extrusion
    }

    /// Positive extrusion per tool, mm
    pub fn filament_per_tool(&self) -> &BTreeMap<u32, f64> {
        &self.filament_per_tool
    }

    /// Inferred layer height, if enough heights have been seen
    pub fn layer_height(&self) -> Option<f64> {
        self.config.layer_height.or(self.tracker.learned_height())
    }

    /// Estimated duration of the whole document
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cumulative.last().copied().unwrap_or(0.0))
    }

    /// Estimated time to execute every command before `index`
    pub fn duration_until(&self, index: usize) -> Duration {
        let seconds = match index.checked_sub(1) {
            None => 0.0,
            Some(last) => self
                .cumulative
                .get(last)
                .or(self.cumulative.last())
                .copied()
                .unwrap_or(0.0),
        };
        Duration::from_secs_f64(seconds)
    }

    /// Estimated time for the commands from `index` on
    pub fn remaining_duration(&self, index: usize) -> Duration {
        self.estimated_duration()
            .saturating_sub(self.duration_until(index))
    }

    /// Lines that could not be tokenized
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Machine state after the last appended command
    pub fn final_state(&self) -> &MachineState {
        &self.state
    }

    /// Replace a layer's commands. The new commands are passive.
    ///
    /// Aggregates (bounds, filament) keep describing the interpreted commands.
    pub fn rewrite_layer<I, S>(&mut self, layer: usize, lines: I) -> Result<(), GcodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let target = self.layer_mut(layer)?;
        target.commands.clear();
        target.durations.clear();
        for line in lines {
            target.push(Command::passive(line.as_ref()), 0.0);
        }
        self.rebuild_index();
        Ok(())
    }

    /// Insert passive commands at the front of a layer
    pub fn prepend_to_layer<I, S>(&mut self, layer: usize, lines: I) -> Result<(), GcodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let target = self.layer_mut(layer)?;
        let inserted: Vec<Command> = lines
            .into_iter()
            .map(|line| Command::passive(line.as_ref()))
            .collect();
        let count = inserted.len();
        let existing = std::mem::take(&mut target.commands);
        target.commands = inserted.into_iter().chain(existing).collect();
        let existing = std::mem::take(&mut target.durations);
        target.durations = std::iter::repeat(0.0).take(count).chain(existing).collect();
        self.rebuild_index();
        Ok(())
    }

    fn layer_mut(&mut self, layer: usize) -> Result<&mut Layer, GcodeError> {
        let count = self.layers.len();
        self.layers
            .get_mut(layer)
            .ok_or(GcodeError::LayerOutOfRange { layer, count })
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        self.cumulative.clear();
        let mut total = 0.0;
        for (layer_index, layer) in self.layers.iter().enumerate() {
            for (position, seconds) in layer.durations.iter().enumerate() {
                total += seconds;
                self.index.push((layer_index, position));
                self.cumulative.push(total);
            }
        }
    }
}
