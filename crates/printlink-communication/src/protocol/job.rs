//! Print job state machine
//!
//! [`JobState`] decides what goes on the wire next. It owns the queue
//! cursor, line numbering, the retained frames used for resends and the
//! sent-side machine model. It performs no I/O; the controller takes the
//! send credit, asks for a [`Step`] and writes the result.
//!
//! Selection order for each step:
//! 1. an active resend run
//! 2. a pending `M110` line-number reset
//! 3. the resume / recovery prelude
//! 4. the priority queue
//! 5. the main queue

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use printlink_core::{format_coordinate, JobError, JobPhase, MeasurementSystem, ProtocolError};
use printlink_gcode::{Command, Document, MachineState};
use serde::{Deserialize, Serialize};

use super::framing;

/// Machine state captured when a job is paused
///
/// Coordinates are logical millimeters; the feed rate is kept as the job
/// wrote it, in job units per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseSnapshot {
    /// Logical X
    pub x: f64,
    /// Logical Y
    pub y: f64,
    /// Logical Z
    pub z: f64,
    /// Logical E
    pub e: f64,
    /// Feed rate in job units per minute
    pub feed_rate: f64,
    /// G91 was in effect
    pub relative: bool,
    /// Relative extrusion was in effect
    pub relative_extrusion: bool,
    /// G20/G21 mode the controller was left in
    pub units: MeasurementSystem,
}

impl PauseSnapshot {
    /// Capture from the sent-side machine model
    pub fn capture(state: &MachineState) -> Self {
        let [x, y, z] = state.logical_position();
        Self {
            x,
            y,
            z,
            e: state.logical_extrusion(),
            feed_rate: state.feed_rate,
            relative: state.relative,
            relative_extrusion: state.relative_extrusion,
            units: state.units,
        }
    }

    /// Commands that return the machine to this snapshot.
    ///
    /// Values are written in the snapshot's units, since the controller is
    /// still in that mode. `xy_feed` overrides the captured feed for the XY
    /// move; `z_feed` applies to the Z move only.
    pub fn resume_prelude(&self, xy_feed: Option<f64>, z_feed: Option<f64>) -> Vec<String> {
        let feed_word = |feed: Option<f64>| match feed {
            Some(f) if f > 0.0 => format!(" F{}", format_coordinate(f)),
            _ => String::new(),
        };
        let word = |mm: f64| format_coordinate(self.units.from_mm(mm));

        let mut lines = vec![
            "G90".to_string(),
            format!(
                "G1 X{} Y{}{}",
                word(self.x),
                word(self.y),
                feed_word(xy_feed.or(Some(self.feed_rate)))
            ),
            format!("G1 Z{}{}", word(self.z), feed_word(z_feed)),
            format!("G92 E{}", word(self.e)),
        ];

        // G90/G91 switch extrusion mode along with the axes
        if self.relative {
            lines.push("G91".to_string());
        }
        if self.relative_extrusion != self.relative {
            lines.push(if self.relative_extrusion { "M83" } else { "M82" }.to_string());
        }
        if self.feed_rate > 0.0 {
            lines.push(format!("G1 F{}", format_coordinate(self.feed_rate)));
        }
        lines
    }
}

/// What a lost connection left behind
#[derive(Debug, Clone)]
pub struct RecoverySnapshot {
    /// Document that was printing
    pub document: Arc<Document>,
    /// Next main-queue index that had not been sent
    pub queue_index: usize,
    /// Logical Z at the time of loss, in millimeters
    pub z: f64,
    /// G20/G21 mode in effect at the time of loss
    pub units: MeasurementSystem,
}

impl RecoverySnapshot {
    /// Commands sent ahead of the remaining job, in the job's units
    pub fn recovery_prelude(&self) -> Vec<String> {
        vec![
            format!("G92 Z{}", format_coordinate(self.units.from_mm(self.z))),
            "G28 X Y".to_string(),
        ]
    }
}

/// Where an outgoing line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Retransmission of a retained frame
    Resend,
    /// `M110` line-number reset
    Reset,
    /// Resume or recovery prelude
    Prelude,
    /// Out-of-band command
    Priority,
    /// Main queue
    Job,
}

/// A line ready for the wire
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Exact text to write, without the trailing newline
    pub frame: String,
    /// Parsed form of the line
    pub command: Command,
    /// Source queue
    pub origin: LineOrigin,
    /// Layer entered by this line
    pub layer_change: Option<usize>,
}

/// Result of [`JobState::next_step`]
#[derive(Debug, Clone)]
pub enum Step {
    /// Write this line
    Send(Outgoing),
    /// Run a host directive; nothing is written
    Directive {
        /// Directive text after `;@`
        text: String,
        /// Layer entered at the directive
        layer_change: Option<usize>,
    },
    /// Nothing to send right now
    Idle,
    /// Main queue exhausted; the job is complete
    Finished,
}

/// Progress of the current job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    /// Job phase
    pub phase: JobPhase,
    /// Next main-queue index
    pub queue_index: usize,
    /// Commands in the document
    pub total: usize,
    /// `queue_index / total`
    pub fraction: f64,
    /// Layer of the last command sent
    pub layer: Option<usize>,
    /// Layers in the document
    pub layer_count: usize,
    /// When the job started
    pub started_at: Option<DateTime<Local>>,
    /// Wall time since start
    pub elapsed: Option<Duration>,
    /// Estimated time left
    pub remaining: Option<Duration>,
}

/// Job bookkeeping shared by the print and sender loops
#[derive(Debug)]
pub struct JobState {
    home: [f64; 3],
    phase: JobPhase,
    document: Option<Arc<Document>>,
    queue_index: usize,
    line_number: u64,
    resend_from: Option<u64>,
    sent_lines: HashMap<u64, String>,
    /// Line number -> document index, for main-queue frames
    job_lines: BTreeMap<u64, usize>,
    pending_reset: bool,
    prelude: VecDeque<String>,
    shadow: MachineState,
    current_layer: Option<usize>,
    pause: Option<PauseSnapshot>,
    recovery: Option<RecoverySnapshot>,
    started_at: Option<DateTime<Local>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new([0.0; 3])
    }
}

impl JobState {
    /// Idle state for a machine homing at `home`
    pub fn new(home: [f64; 3]) -> Self {
        Self {
            home,
            phase: JobPhase::Idle,
            document: None,
            queue_index: 0,
            line_number: 0,
            resend_from: None,
            sent_lines: HashMap::new(),
            job_lines: BTreeMap::new(),
            pending_reset: false,
            prelude: VecDeque::new(),
            shadow: MachineState::with_home(home),
            current_layer: None,
            pause: None,
            recovery: None,
            started_at: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Next main-queue index
    pub fn queue_index(&self) -> usize {
        self.queue_index
    }

    /// Number the next numbered frame will carry
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Cursor of the active resend run
    pub fn resend_from(&self) -> Option<u64> {
        self.resend_from
    }

    /// Retained frame for `line_number`
    pub fn sent_line(&self, line_number: u64) -> Option<&str> {
        self.sent_lines.get(&line_number).map(String::as_str)
    }

    /// Sent-side machine model
    pub fn shadow(&self) -> &MachineState {
        &self.shadow
    }

    /// Snapshot taken by the last pause
    pub fn pause_snapshot(&self) -> Option<&PauseSnapshot> {
        self.pause.as_ref()
    }

    /// Snapshot left by a lost connection
    pub fn recovery_snapshot(&self) -> Option<&RecoverySnapshot> {
        self.recovery.as_ref()
    }

    /// Whether a line-number reset is waiting to go out
    pub fn has_pending_reset(&self) -> bool {
        self.pending_reset
    }

    /// Begin streaming `document` from `start_index`
    pub fn start(&mut self, document: Arc<Document>, start_index: usize) -> Result<(), JobError> {
        self.require(JobPhase::Idle, JobPhase::Printing)?;
        let start_index = start_index.min(document.len());
        self.begin(document, start_index, Vec::new());
        Ok(())
    }

    /// Suspend streaming and capture the machine state
    pub fn pause(&mut self) -> Result<PauseSnapshot, JobError> {
        self.require(JobPhase::Printing, JobPhase::Paused)?;
        let snapshot = PauseSnapshot::capture(&self.shadow);
        self.phase = JobPhase::Paused;
        self.prelude.clear();
        self.pause = Some(snapshot);
        Ok(snapshot)
    }

    /// Continue a paused job from the same queue index
    pub fn resume(&mut self, xy_feed: Option<f64>, z_feed: Option<f64>) -> Result<(), JobError> {
        self.require(JobPhase::Paused, JobPhase::Printing)?;
        let prelude = self
            .pause
            .take()
            .map(|p| p.resume_prelude(xy_feed, z_feed))
            .unwrap_or_default();
        self.prelude = prelude.into();
        self.pending_reset = true;
        self.phase = JobPhase::Printing;
        Ok(())
    }

    /// Abandon the job, whatever phase it is in
    pub fn cancel(&mut self) -> Result<(), JobError> {
        if self.phase == JobPhase::Idle {
            return Err(JobError::InvalidStateTransition {
                current: self.phase.to_string(),
                requested: JobPhase::Idle.to_string(),
            });
        }
        self.reset_to_idle();
        Ok(())
    }

    /// Record what a lost connection interrupted.
    ///
    /// Returns true when a snapshot is held afterwards.
    pub fn mark_recoverable(&mut self) -> bool {
        match self.phase {
            JobPhase::Printing | JobPhase::Paused => {
                // Lines still owed to a resend were never confirmed
                let queue_index = self
                    .resend_from
                    .and_then(|n| self.job_lines.range(n..).next().map(|(_, &i)| i))
                    .unwrap_or(self.queue_index);
                if let Some(document) = self.document.take() {
                    self.recovery = Some(RecoverySnapshot {
                        document,
                        queue_index,
                        z: self.shadow.logical_position()[2],
                        units: self.shadow.units,
                    });
                }
                self.phase = JobPhase::Recoverable;
                self.prelude.clear();
                self.resend_from = None;
                self.sent_lines.clear();
                self.job_lines.clear();
                self.pause = None;
                self.recovery.is_some()
            }
            JobPhase::Recoverable => self.recovery.is_some(),
            JobPhase::Idle => false,
        }
    }

    /// Restart a recoverable job as a fresh job from its snapshot index
    pub fn recover(&mut self) -> Result<(), JobError> {
        if self.phase != JobPhase::Recoverable {
            return Err(JobError::NothingToRecover);
        }
        let snapshot = self.recovery.take().ok_or(JobError::NothingToRecover)?;
        let prelude = snapshot.recovery_prelude();
        self.phase = JobPhase::Idle;
        self.begin(snapshot.document, snapshot.queue_index, prelude);
        Ok(())
    }

    /// Register a resend request from the controller.
    ///
    /// Returns `Ok(false)` for a request that does not move an active run
    /// forward.
    pub fn request_resend(&mut self, line_number: u64) -> Result<bool, ProtocolError> {
        if line_number >= self.line_number || !self.sent_lines.contains_key(&line_number) {
            return Err(ProtocolError::ResendUnavailable { line_number });
        }
        match self.resend_from {
            Some(cursor) if line_number <= cursor => Ok(false),
            _ => {
                self.resend_from = Some(line_number);
                Ok(true)
            }
        }
    }

    /// Put back a line whose write failed so it is sent again
    pub fn write_failed(&mut self, outgoing: &Outgoing) {
        match outgoing.origin {
            LineOrigin::Reset => self.pending_reset = true,
            LineOrigin::Priority => {
                tracing::warn!("Dropped unsent command: {}", outgoing.frame)
            }
            LineOrigin::Resend | LineOrigin::Prelude | LineOrigin::Job => {
                let Some((number, _, _)) = framing::split_frame(&outgoing.frame) else {
                    return;
                };
                if let Ok(number) = u64::try_from(number) {
                    self.resend_from = Some(self.resend_from.map_or(number, |c| c.min(number)));
                }
            }
        }
    }

    /// Pick the next thing to send.
    ///
    /// Main-queue and prelude lines are only considered with `include_job`.
    /// `priority` yields queued out-of-band commands.
    pub fn next_step(&mut self, include_job: bool, mut priority: impl FnMut() -> Option<String>) -> Step {
        while let Some(cursor) = self.resend_from {
            let next = cursor + 1;
            self.resend_from = (next < self.line_number).then_some(next);
            if let Some(frame) = self.sent_lines.get(&cursor) {
                return Step::Send(Outgoing {
                    command: Command::parse(frame),
                    frame: frame.clone(),
                    origin: LineOrigin::Resend,
                    layer_change: None,
                });
            }
            tracing::warn!("Line {} is not retained; skipping resend", cursor);
        }

        if self.pending_reset {
            self.pending_reset = false;
            let frame = framing::reset_frame(self.line_number);
            return Step::Send(Outgoing {
                command: Command::parse(&frame),
                frame,
                origin: LineOrigin::Reset,
                layer_change: None,
            });
        }

        let streaming = include_job && self.phase == JobPhase::Printing;

        if streaming {
            while let Some(line) = self.prelude.pop_front() {
                let command = Command::parse(&line);
                if !command.is_empty() {
                    return Step::Send(self.numbered(command, LineOrigin::Prelude, None));
                }
            }
        }

        while let Some(line) = priority() {
            let command = Command::parse(&line);
            if command.is_empty() {
                continue;
            }
            self.shadow = self.shadow.step(&command).0;
            return Step::Send(Outgoing {
                frame: command.payload().to_string(),
                command,
                origin: LineOrigin::Priority,
                layer_change: None,
            });
        }

        if !streaming {
            return Step::Idle;
        }

        let Some(document) = self.document.clone() else {
            return Step::Finished;
        };

        let mut layer_change = None;
        while let Some(command) = document.get(self.queue_index) {
            let index = self.queue_index;
            self.queue_index += 1;

            let layer = document.layer_of(index);
            if layer.is_some() && layer != self.current_layer {
                self.current_layer = layer;
                layer_change = layer;
            }

            if let Some(text) = command.directive() {
                return Step::Directive {
                    text: text.to_string(),
                    layer_change,
                };
            }
            if command.is_empty() {
                continue;
            }
            self.job_lines.insert(self.line_number, index);
            return Step::Send(self.numbered(command.clone(), LineOrigin::Job, layer_change));
        }

        self.complete();
        Step::Finished
    }

    /// Progress of the active, paused or recoverable job
    pub fn progress(&self) -> JobProgress {
        let (document, queue_index) = match (&self.document, &self.recovery) {
            (Some(document), _) => (Some(document), self.queue_index),
            (None, Some(snapshot)) => (Some(&snapshot.document), snapshot.queue_index),
            (None, None) => (None, self.queue_index),
        };

        let total = document.map_or(0, |d| d.len());
        let fraction = if total == 0 {
            0.0
        } else {
            queue_index as f64 / total as f64
        };
        let elapsed = self
            .started_at
            .and_then(|start| (Local::now() - start).to_std().ok());

        JobProgress {
            phase: self.phase,
            queue_index,
            total,
            fraction,
            layer: self.current_layer,
            layer_count: document.map_or(0, |d| d.layer_count()),
            started_at: self.started_at,
            elapsed,
            remaining: document.map(|d| d.remaining_duration(queue_index)),
        }
    }

    fn require(&self, from: JobPhase, to: JobPhase) -> Result<(), JobError> {
        if self.phase == from {
            Ok(())
        } else {
            Err(JobError::InvalidStateTransition {
                current: self.phase.to_string(),
                requested: to.to_string(),
            })
        }
    }

    fn begin(&mut self, document: Arc<Document>, start_index: usize, prelude: Vec<String>) {
        let mut shadow = MachineState::with_home(self.home);
        for command in document.iter().take(start_index) {
            shadow = shadow.step(command).0;
        }

        self.phase = JobPhase::Printing;
        self.queue_index = start_index;
        self.line_number = 0;
        self.resend_from = None;
        self.sent_lines.clear();
        self.job_lines.clear();
        self.pending_reset = true;
        self.prelude = prelude.into();
        self.shadow = shadow;
        self.current_layer = None;
        self.pause = None;
        self.recovery = None;
        self.started_at = Some(Local::now());
        self.document = Some(document);
    }

    fn numbered(&mut self, command: Command, origin: LineOrigin, layer_change: Option<usize>) -> Outgoing {
        let frame = framing::frame(self.line_number, command.payload());
        self.sent_lines.insert(self.line_number, frame.clone());
        self.line_number += 1;
        self.shadow = self.shadow.step(&command).0;
        Outgoing {
            frame,
            command,
            origin,
            layer_change,
        }
    }

    fn complete(&mut self) {
        let document = self.document.take();
        self.reset_to_idle();
        if let Some(document) = document {
            tracing::info!("Job complete: {} commands sent", document.len());
        }
    }

    fn reset_to_idle(&mut self) {
        self.phase = JobPhase::Idle;
        self.document = None;
        self.queue_index = 0;
        self.line_number = 0;
        self.resend_from = None;
        self.sent_lines.clear();
        self.job_lines.clear();
        self.pending_reset = true;
        self.prelude.clear();
        self.current_layer = None;
        self.pause = None;
        self.recovery = None;
        self.started_at = None;
    }
}
