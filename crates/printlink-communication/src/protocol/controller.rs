//! Host controller
//!
//! Owns one connection and its worker threads:
//! - `printlink-reader` runs the handshake, then classifies every received line
//! - `printlink-sender` sends priority commands, resets and resends while no job streams
//! - `printlink-print` streams the main queue for the life of one job
//!
//! At most one line is unacknowledged at a time (see [`Credit`]), except on
//! TCP links with `tcp_streaming` enabled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use parking_lot::{Mutex, RwLock};
use printlink_core::{
    ConnectionError, EventDispatcher, JobError, JobPhase, ListenerHandle, ListenerRegistry,
    PositionReport, PrintEvent, ProtocolError, Result, TemperatureReport, TransportError,
};
use printlink_gcode::{Document, MachineState, DIRECTIVE_MARKER};
use tokio::sync::broadcast;

use super::config::StreamConfig;
use super::credit::Credit;
use super::job::{JobProgress, JobState, Outgoing, PauseSnapshot, RecoverySnapshot, Step};
use super::listener::PrintListener;
use super::response::{Response, ResponseParser};
use crate::communication::{self, Transport, TransportKind};

/// Handler for a `;@name args` directive; receives the argument text
pub type DirectiveHandler = Arc<dyn Fn(&HostController, &str) + Send + Sync>;

/// Name of the directive every controller understands
pub const PAUSE_DIRECTIVE: &str = "pause";

/// Lines read without an online marker before the handshake polls again
const HANDSHAKE_LINES_PER_POLL: u32 = 32;

#[derive(Default)]
struct Workers {
    reader: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
    print: Option<JoinHandle<()>>,
}

enum Outcome {
    Sent(Outgoing),
    WriteFailed,
    Directive {
        text: String,
        layer_change: Option<usize>,
    },
    Idle,
    Finished,
}

struct Shared {
    config: StreamConfig,
    parser: ResponseParser,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    online: AtomicBool,
    stop: AtomicBool,
    credit: Credit,
    job: Mutex<JobState>,
    send_lock: Mutex<()>,
    write_failures: AtomicU32,
    print_generation: AtomicU64,
    print_threads: AtomicUsize,
    resend_tx: Sender<u64>,
    resend_rx: Receiver<u64>,
    priority_tx: Sender<String>,
    priority_rx: Receiver<String>,
    listeners: ListenerRegistry<dyn PrintListener>,
    events: EventDispatcher,
    directives: RwLock<HashMap<String, DirectiveHandler>>,
    workers: Mutex<Workers>,
    teardown: Mutex<()>,
}

/// Streams G-code to a connected controller.
///
/// Cheap to clone; clones share the same connection and job.
#[derive(Clone)]
pub struct HostController {
    shared: Arc<Shared>,
}

impl HostController {
    /// Create a disconnected controller
    pub fn new(config: StreamConfig) -> Self {
        let parser = ResponseParser::new(config.greetings.clone());
        Self::with_response_parser(config, parser)
    }

    /// Create a controller with a customised response parser
    pub fn with_response_parser(config: StreamConfig, parser: ResponseParser) -> Self {
        let (resend_tx, resend_rx) = unbounded();
        let (priority_tx, priority_rx) = unbounded();
        let job = JobState::new(config.home);

        Self {
            shared: Arc::new(Shared {
                config,
                parser,
                transport: RwLock::new(None),
                online: AtomicBool::new(false),
                stop: AtomicBool::new(true),
                credit: Credit::default(),
                job: Mutex::new(job),
                send_lock: Mutex::new(()),
                write_failures: AtomicU32::new(0),
                print_generation: AtomicU64::new(0),
                print_threads: AtomicUsize::new(0),
                resend_tx,
                resend_rx,
                priority_tx,
                priority_rx,
                listeners: ListenerRegistry::new(),
                events: EventDispatcher::default(),
                directives: RwLock::new(HashMap::new()),
                workers: Mutex::new(Workers::default()),
                teardown: Mutex::new(()),
            }),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn PrintListener>) -> ListenerHandle {
        self.shared.listeners.register(listener)
    }

    /// Remove a listener; false if the handle is unknown
    pub fn remove_listener(&self, handle: &ListenerHandle) -> bool {
        self.shared.listeners.unregister(handle)
    }

    /// Receive every event as a [`PrintEvent`]
    pub fn subscribe(&self) -> broadcast::Receiver<PrintEvent> {
        self.shared.events.subscribe()
    }

    /// Handle `;@name` lines with `handler`. Names are case-insensitive.
    pub fn register_directive<F>(&self, name: &str, handler: F)
    where
        F: Fn(&HostController, &str) + Send + Sync + 'static,
    {
        self.shared
            .directives
            .write()
            .insert(name.to_ascii_lowercase(), Arc::new(handler));
    }

    /// Open `address` (device path or `host:port`) and start the handshake
    pub fn connect(&self, address: &str, baud_rate: u32) -> Result<()> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected.into());
        }
        let transport = communication::connect(address, baud_rate, &self.shared.config.transport)?;
        self.connect_with(transport)
    }

    /// Start the handshake over an already opened transport
    pub fn connect_with(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let shared = &self.shared;
        {
            let mut slot = shared.transport.write();
            if slot.is_some() {
                return Err(ConnectionError::AlreadyConnected.into());
            }
            *slot = Some(Arc::clone(&transport));
        }

        shared.online.store(false, Ordering::SeqCst);
        shared.write_failures.store(0, Ordering::SeqCst);
        while shared.resend_rx.try_recv().is_ok() {}
        while shared.priority_rx.try_recv().is_ok() {}
        shared.credit.release();
        shared.stop.store(false, Ordering::SeqCst);

        tracing::info!("Connecting to {} ({})", transport.name(), transport.kind());

        let reader = {
            let controller = self.clone();
            let transport = Arc::clone(&transport);
            thread::Builder::new()
                .name("printlink-reader".to_string())
                .spawn(move || controller.reader_loop(transport))
        };
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_connect();
                return Err(e.into());
            }
        };
        shared.workers.lock().reader = Some(reader);

        let sender = {
            let controller = self.clone();
            thread::Builder::new()
                .name("printlink-sender".to_string())
                .spawn(move || controller.sender_loop())
        };
        match sender {
            Ok(handle) => shared.workers.lock().sender = Some(handle),
            Err(e) => {
                self.abort_connect();
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Close the connection.
    ///
    /// A job in progress becomes [`JobPhase::Recoverable`].
    pub fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        if !self.shared.stop.swap(true, Ordering::SeqCst) {
            tracing::info!("Disconnecting");
            self.halt();
        }
        self.finish_disconnect();
        Ok(())
    }

    /// A transport is attached
    pub fn is_connected(&self) -> bool {
        self.shared.transport.read().is_some()
    }

    /// The handshake has completed on the current connection
    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::SeqCst)
    }

    /// Block until online or until `timeout` passes
    pub fn wait_online(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_online() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Current job phase
    pub fn phase(&self) -> JobPhase {
        self.shared.job.lock().phase()
    }

    /// Stream `document` from `start_index`
    pub fn start_print(&self, document: Arc<Document>, start_index: usize) -> Result<()> {
        self.require_online()?;
        let total = document.len();
        self.shared.job.lock().start(document, start_index)?;
        tracing::info!("Starting print of {} commands at index {}", total, start_index);
        self.publish_phase(JobPhase::Printing);
        self.spawn_print(false)
    }

    /// Suspend the job after the line in flight and queue the on-pause script
    pub fn pause(&self) -> Result<PauseSnapshot> {
        let snapshot = self.shared.job.lock().pause()?;
        self.shared.print_generation.fetch_add(1, Ordering::SeqCst);
        for line in &self.shared.config.on_pause_script {
            self.queue_priority(line.clone());
        }
        self.join_print();

        tracing::info!(
            "Paused at X{} Y{} Z{} E{}",
            snapshot.x,
            snapshot.y,
            snapshot.z,
            snapshot.e
        );
        self.publish_phase(JobPhase::Paused);
        Ok(snapshot)
    }

    /// Return to the pause point and continue the job
    pub fn resume(&self) -> Result<()> {
        self.require_online()?;
        let config = &self.shared.config;
        self.shared
            .job
            .lock()
            .resume(config.resume_xy_feed, config.resume_z_feed)?;
        tracing::info!("Resuming print");
        self.publish_phase(JobPhase::Printing);
        self.spawn_print(true)
    }

    /// Abandon the job
    pub fn cancel(&self) -> Result<()> {
        self.shared.job.lock().cancel()?;
        self.shared.print_generation.fetch_add(1, Ordering::SeqCst);
        self.join_print();
        tracing::info!("Print cancelled");
        self.publish_phase(JobPhase::Idle);
        Ok(())
    }

    /// Continue a job interrupted by a lost connection
    pub fn recover(&self) -> Result<()> {
        self.require_online()?;
        self.shared.job.lock().recover()?;
        tracing::info!("Recovering interrupted print");
        self.publish_phase(JobPhase::Printing);
        self.spawn_print(true)
    }

    /// Queue `command` ahead of the main queue.
    ///
    /// A `;@` line runs its directive immediately instead.
    pub fn send_now(&self, command: &str) -> Result<()> {
        self.require_online()?;
        let command = command.trim();
        if let Some(directive) = command.strip_prefix(DIRECTIVE_MARKER) {
            self.run_directive(directive.trim());
            return Ok(());
        }
        self.queue_priority(command.to_string());
        Ok(())
    }

    fn queue_priority(&self, line: String) {
        if let Err(e) = self.shared.priority_tx.send(line) {
            tracing::warn!("Dropped priority command {}: channel closed", e.0);
        }
    }

    /// Hardware reset through the transport
    pub fn reset(&self) -> Result<()> {
        let transport = self.transport().ok_or(ConnectionError::NotConnected)?;
        transport.reset()?;
        Ok(())
    }

    /// Job progress and time estimate
    pub fn progress(&self) -> JobProgress {
        self.shared.job.lock().progress()
    }

    /// State captured by the last pause, until resumed
    pub fn pause_snapshot(&self) -> Option<PauseSnapshot> {
        self.shared.job.lock().pause_snapshot().copied()
    }

    /// Snapshot of an interrupted job
    pub fn recovery_snapshot(&self) -> Option<RecoverySnapshot> {
        self.shared.job.lock().recovery_snapshot().cloned()
    }

    /// Machine model driven by every line sent so far
    pub fn shadow_state(&self) -> MachineState {
        *self.shared.job.lock().shadow()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.shared.transport.read().clone()
    }

    fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    fn require_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(JobError::Offline.into())
        }
    }

    fn needs_credit(&self) -> bool {
        let streaming_tcp = self
            .transport()
            .is_some_and(|t| t.kind() == TransportKind::Tcp);
        !(self.shared.config.tcp_streaming && streaming_tcp)
    }

    fn spawn_print(&self, resume: bool) -> Result<()> {
        self.join_print();
        let shared = &self.shared;
        let generation = shared.print_generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.print_threads.fetch_add(1, Ordering::SeqCst);

        let controller = self.clone();
        let spawned = thread::Builder::new()
            .name("printlink-print".to_string())
            .spawn(move || controller.print_loop(generation, resume));

        match spawned {
            Ok(handle) => {
                shared.workers.lock().print = Some(handle);
                Ok(())
            }
            Err(e) => {
                shared.print_threads.fetch_sub(1, Ordering::SeqCst);
                tracing::error!("Failed to start print thread: {}", e);
                Err(e.into())
            }
        }
    }

    fn join_print(&self) {
        let handle = self.shared.workers.lock().print.take();
        if let Some(handle) = handle {
            join_unless_current(handle);
        }
    }

    fn reader_loop(&self, transport: Arc<dyn Transport>) {
        match self.handshake(transport.as_ref()) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                self.connection_lost(&e.to_string());
                return;
            }
        }

        self.shared.online.store(true, Ordering::SeqCst);
        tracing::info!("Controller on {} is online", transport.name());
        self.notify(PrintEvent::Online, |l| l.on_online());

        let timeout = self.shared.config.read_timeout;
        while !self.stopped() {
            match transport.read_line(timeout) {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {}
                Err(e) => {
                    if !self.stopped() {
                        self.connection_lost(&format!("Read failed: {}", e));
                    }
                    break;
                }
            }
        }
    }

    /// Poll until the controller answers. `Ok(false)` when stopped first.
    fn handshake(&self, transport: &dyn Transport) -> std::result::Result<bool, ConnectionError> {
        let config = &self.shared.config;
        let poll = format!("{}\n", config.status_poll_command);
        let mut write_failures = 0;

        for attempt in 1..=config.handshake_attempts {
            if self.stopped() {
                return Ok(false);
            }

            if let Err(e) = transport.write_all(poll.as_bytes()) {
                write_failures += 1;
                tracing::warn!(
                    "Handshake write failed ({}/{}): {}",
                    write_failures,
                    config.write_failure_limit,
                    e
                );
                if write_failures >= config.write_failure_limit {
                    return Err(ConnectionError::HandshakeFailed {
                        reason: format!("{} consecutive write failures: {}", write_failures, e),
                    });
                }
                thread::sleep(config.poll_interval);
                continue;
            }
            write_failures = 0;
            tracing::debug!("Handshake poll {}/{}", attempt, config.handshake_attempts);

            let mut empty_reads = 0;
            let mut other_lines = 0;
            while empty_reads < config.handshake_empty_reads
                && other_lines < HANDSHAKE_LINES_PER_POLL
            {
                if self.stopped() {
                    return Ok(false);
                }
                match transport.read_line(config.read_timeout) {
                    Ok(None) => empty_reads += 1,
                    Ok(Some(line)) => {
                        empty_reads = 0;
                        other_lines += 1;
                        self.report_received(&line);
                        if self.shared.parser.is_online_marker(&line) {
                            if let Some(report) = super::response::parse_temperature(&line) {
                                self.report_temperature(&report);
                            }
                            return Ok(true);
                        }
                    }
                    Err(e) => {
                        return Err(ConnectionError::HandshakeFailed {
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }

        Err(ConnectionError::HandshakeFailed {
            reason: format!("no reply after {} polls", config.handshake_attempts),
        })
    }

    fn handle_line(&self, line: &str) {
        self.report_received(line);

        let response = self.shared.parser.classify(line);
        match &response {
            Response::Ok { temperature } => {
                if let Some(report) = temperature {
                    self.report_temperature(report);
                }
            }
            Response::Resend(n) => {
                tracing::debug!("Controller requested resend from line {}", n);
                if let Err(e) = self.shared.resend_tx.send(*n) {
                    tracing::warn!("Dropped resend request for line {}: channel closed", e.0);
                }
            }
            Response::UnparseableResend => {
                let err = ProtocolError::UnparseableResend {
                    line: line.to_string(),
                };
                tracing::warn!("{}", err);
            }
            Response::Temperature(report) => self.report_temperature(report),
            Response::Position(report) => self.report_position(report),
            Response::Error(message) => {
                tracing::warn!("Controller error: {}", message);
                self.notify(PrintEvent::Error(message.clone()), |l| l.on_error(message));
            }
            Response::Greeting => tracing::info!("Controller greeting: {}", line),
            Response::Debug | Response::Other => {}
        }

        if response.releases_credit() {
            self.shared.credit.release();
        }
    }

    fn sender_loop(&self) {
        let shared = &self.shared;
        let poll = shared.config.poll_interval;
        let printing = || shared.print_threads.load(Ordering::SeqCst) > 0;

        while !self.stopped() {
            if !self.is_online() || printing() {
                thread::sleep(poll);
                continue;
            }

            let pending = !shared.priority_rx.is_empty()
                || !shared.resend_rx.is_empty()
                || shared.job.lock().has_pending_reset();
            if !pending {
                let mut select = Select::new();
                select.recv(&shared.priority_rx);
                select.recv(&shared.resend_rx);
                let _ = select.ready_timeout(poll);
                continue;
            }

            if self.needs_credit()
                && !shared
                    .credit
                    .acquire(poll, || self.stopped() || printing())
            {
                continue;
            }

            match self.send_step(false) {
                Outcome::Sent(_) => {}
                Outcome::Directive { text, .. } => {
                    shared.credit.release();
                    self.run_directive(&text);
                }
                Outcome::WriteFailed | Outcome::Idle | Outcome::Finished => shared.credit.release(),
            }
        }
    }

    fn print_loop(&self, generation: u64, resume: bool) {
        let shared = &self.shared;
        let poll = shared.config.poll_interval;
        let current = || {
            shared.print_generation.load(Ordering::SeqCst) == generation && !self.stopped()
        };

        self.notify(PrintEvent::PrintStarted { resume }, |l| l.on_print_start(resume));

        while current() {
            if self.needs_credit() && !shared.credit.acquire(poll, || !current()) {
                continue;
            }

            match self.send_step(true) {
                Outcome::Sent(_) => {}
                Outcome::WriteFailed => shared.credit.release(),
                Outcome::Directive { text, .. } => {
                    shared.credit.release();
                    self.run_directive(&text);
                }
                Outcome::Idle => {
                    shared.credit.release();
                    thread::sleep(poll);
                }
                Outcome::Finished => {
                    shared.credit.release();
                    tracing::info!("Print finished");
                    self.publish_phase(JobPhase::Idle);
                    break;
                }
            }
        }

        shared.print_threads.fetch_sub(1, Ordering::SeqCst);
        self.notify(PrintEvent::PrintEnded, |l| l.on_print_end());
    }

    /// Choose and write one line. The caller holds the credit.
    fn send_step(&self, include_job: bool) -> Outcome {
        let shared = &self.shared;
        let outcome = {
            let _sending = shared.send_lock.lock();
            let step = {
                let mut job = shared.job.lock();
                for line_number in shared.resend_rx.try_iter() {
                    match job.request_resend(line_number) {
                        Ok(true) => tracing::info!("Resending from line {}", line_number),
                        Ok(false) => {
                            tracing::debug!("Ignoring repeated resend of line {}", line_number)
                        }
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
                job.next_step(include_job, || shared.priority_rx.try_recv().ok())
            };

            match step {
                Step::Send(outgoing) => match self.write_line(&outgoing.frame) {
                    Ok(()) => Outcome::Sent(outgoing),
                    Err(e) => {
                        shared.job.lock().write_failed(&outgoing);
                        self.record_write_failure(&e);
                        Outcome::WriteFailed
                    }
                },
                Step::Directive { text, layer_change } => Outcome::Directive { text, layer_change },
                Step::Idle => Outcome::Idle,
                Step::Finished => Outcome::Finished,
            }
        };

        // Listeners run without any lock held
        match &outcome {
            Outcome::Sent(outgoing) => {
                self.notify(PrintEvent::LineSent(outgoing.frame.clone()), |l| {
                    l.on_line_sent(&outgoing.frame, &outgoing.command)
                });
                if let Some(layer) = outgoing.layer_change {
                    self.report_layer(layer);
                }
            }
            Outcome::Directive {
                layer_change: Some(layer),
                ..
            } => self.report_layer(*layer),
            _ => {}
        }
        outcome
    }

    fn write_line(&self, frame: &str) -> std::result::Result<(), TransportError> {
        let transport = self.transport().ok_or(TransportError::Closed)?;
        transport.write_all(format!("{}\n", frame).as_bytes())?;
        self.shared.write_failures.store(0, Ordering::SeqCst);
        tracing::debug!("SENT: {}", frame);
        Ok(())
    }

    fn record_write_failure(&self, err: &TransportError) {
        let limit = self.shared.config.write_failure_limit;
        let failures = self.shared.write_failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!("Write failed ({}/{}): {}", failures, limit, err);
        if failures >= limit {
            self.connection_lost(&format!("{} consecutive write failures", failures));
        }
    }

    fn run_directive(&self, text: &str) {
        let (word, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let name = word.to_ascii_lowercase();

        if name == PAUSE_DIRECTIVE {
            if let Err(e) = self.pause() {
                tracing::warn!("Ignoring pause directive: {}", e);
            }
            return;
        }

        let handler = self.shared.directives.read().get(&name).cloned();
        match handler {
            Some(handler) => {
                tracing::info!("Running directive {}", name);
                handler(self, args.trim());
            }
            None => tracing::warn!("Unknown directive: {}", text),
        }
    }

    /// Stop flags for a closing connection; snapshots a running job
    fn halt(&self) {
        let shared = &self.shared;
        if shared.job.lock().mark_recoverable() {
            tracing::warn!("Job interrupted; it can be recovered after reconnecting");
            self.publish_phase(JobPhase::Recoverable);
        }
        shared.online.store(false, Ordering::SeqCst);
        shared.print_generation.fetch_add(1, Ordering::SeqCst);
        shared.credit.release();
    }

    fn connection_lost(&self, reason: &str) {
        if self.shared.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::error!("Connection lost: {}", reason);
        self.halt();
        self.notify(PrintEvent::Error(reason.to_string()), |l| l.on_error(reason));

        let controller = self.clone();
        let reaper = thread::Builder::new()
            .name("printlink-reaper".to_string())
            .spawn(move || controller.finish_disconnect());
        if let Err(e) = reaper {
            tracing::error!("Failed to start teardown thread: {}", e);
        }
    }

    /// Join the workers and close the transport
    fn finish_disconnect(&self) {
        let _teardown = self.shared.teardown.lock();
        let handles = {
            let mut workers = self.shared.workers.lock();
            [
                workers.reader.take(),
                workers.sender.take(),
                workers.print.take(),
            ]
        };
        for handle in handles.into_iter().flatten() {
            join_unless_current(handle);
        }

        let transport = self.shared.transport.write().take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close() {
                tracing::warn!("Error closing {}: {}", transport.name(), e);
            }
            tracing::info!("Disconnected from {}", transport.name());
            self.notify(PrintEvent::Disconnected, |l| l.on_disconnected());
        }
    }

    fn abort_connect(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.finish_disconnect();
    }

    fn notify(&self, event: PrintEvent, mut f: impl FnMut(&dyn PrintListener)) {
        self.shared.listeners.notify(|listener| f(listener));
        self.shared.events.publish(event);
    }

    fn publish_phase(&self, phase: JobPhase) {
        self.shared.events.publish(PrintEvent::PhaseChanged(phase));
    }

    fn report_received(&self, line: &str) {
        tracing::debug!("RECV: {}", line);
        self.notify(PrintEvent::LineReceived(line.to_string()), |l| {
            l.on_line_received(line)
        });
    }

    fn report_temperature(&self, report: &TemperatureReport) {
        self.notify(PrintEvent::Temperature(report.clone()), |l| {
            l.on_temperature(report)
        });
    }

    fn report_position(&self, report: &PositionReport) {
        self.notify(PrintEvent::Position(*report), |l| l.on_position(report));
    }

    fn report_layer(&self, layer: usize) {
        tracing::info!("Layer {}", layer);
        self.notify(PrintEvent::LayerChanged(layer), |l| l.on_layer_change(layer));
    }
}

fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    let name = handle.thread().name().unwrap_or("worker").to_string();
    if handle.join().is_err() {
        tracing::error!("{} thread panicked", name);
    }
}
