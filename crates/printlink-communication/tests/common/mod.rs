#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use printlink_communication::protocol::split_frame;
use printlink_communication::{HostController, PrintListener, StreamConfig, Transport, TransportKind};
use printlink_core::{TemperatureReport, TransportError};
use printlink_gcode::{AnalyzerConfig, Command, Document};

pub const WAIT: Duration = Duration::from_secs(5);

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;
type FailWhen = Box<dyn Fn(&str) -> bool + Send>;

#[derive(Default)]
struct Wire {
    /// `None` marks end of stream
    inbound: VecDeque<Option<String>>,
    written: Vec<String>,
    closed: bool,
}

/// In-memory controller answering each written line through a responder
pub struct FakeController {
    wire: Mutex<Wire>,
    arrived: Condvar,
    responder: Mutex<Responder>,
    fail_writes: Arc<AtomicBool>,
    fail_when: Mutex<Option<FailWhen>>,
    kind: TransportKind,
}

impl FakeController {
    pub fn with_responder<F>(responder: F) -> Arc<Self>
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        Self::build(TransportKind::Serial, Box::new(responder))
    }

    /// Boots with a greeting and acknowledges every line
    pub fn acking() -> Arc<Self> {
        let fake = Self::with_responder(|_| vec!["ok".to_string()]);
        fake.push_line("start");
        fake
    }

    /// Acknowledging controller reached over TCP
    pub fn acking_tcp() -> Arc<Self> {
        let fake = Self::build(TransportKind::Tcp, Box::new(|_: &str| vec!["ok".to_string()]));
        fake.push_line("start");
        fake
    }

    /// Boots with a greeting, then never answers
    pub fn mute(kind: TransportKind) -> Arc<Self> {
        let fake = Self::build(kind, Box::new(|_: &str| Vec::new()));
        fake.push_line("start");
        fake
    }

    /// Never says anything
    pub fn silent() -> Arc<Self> {
        Self::with_responder(|_| Vec::new())
    }

    fn build(kind: TransportKind, responder: Responder) -> Arc<Self> {
        Arc::new(Self {
            wire: Mutex::new(Wire::default()),
            arrived: Condvar::new(),
            responder: Mutex::new(responder),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_when: Mutex::new(None),
            kind,
        })
    }

    /// Switch that makes every write fail while set
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    /// Start failing every write from the first one matching `predicate`
    pub fn fail_from<F>(&self, predicate: F)
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        *self.fail_when.lock().unwrap() = Some(Box::new(predicate));
    }

    pub fn push_line(&self, line: &str) {
        self.wire
            .lock()
            .unwrap()
            .inbound
            .push_back(Some(line.to_string()));
        self.arrived.notify_all();
    }

    /// Peer closes the link
    pub fn hang_up(&self) {
        self.wire.lock().unwrap().inbound.push_back(None);
        self.arrived.notify_all();
    }

    /// Successfully written lines, without newlines
    pub fn written(&self) -> Vec<String> {
        self.wire.lock().unwrap().written.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.wire.lock().unwrap().closed
    }
}

impl Transport for FakeController {
    fn read_line(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut wire = self.wire.lock().unwrap();
        loop {
            if wire.closed {
                return Err(TransportError::Closed);
            }
            match wire.inbound.pop_front() {
                Some(Some(line)) => return Ok(Some(line)),
                Some(None) => return Err(TransportError::Eof),
                None => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            wire = self.arrived.wait_timeout(wire, deadline - now).unwrap().0;
        }
    }

    fn write_all(&self, data: &[u8]) -> Result<(), TransportError> {
        let line = String::from_utf8_lossy(data).trim_end().to_string();
        if self.wire.lock().unwrap().closed {
            return Err(TransportError::Closed);
        }
        if let Some(predicate) = self.fail_when.lock().unwrap().as_ref() {
            if predicate(&line) {
                self.fail_writes.store(true, Ordering::SeqCst);
            }
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write {
                reason: "cable unplugged".to_string(),
            });
        }

        self.wire.lock().unwrap().written.push(line.clone());
        let replies = {
            let mut responder = self.responder.lock().unwrap();
            (&mut *responder)(&line)
        };
        if !replies.is_empty() {
            let mut wire = self.wire.lock().unwrap();
            wire.inbound.extend(replies.into_iter().map(Some));
            drop(wire);
            self.arrived.notify_all();
        }
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.wire.lock().unwrap().closed = true;
        self.arrived.notify_all();
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn name(&self) -> String {
        "fake".to_string()
    }
}

/// Listener keeping every callback it sees
#[derive(Default)]
pub struct Recorder {
    pub sent: Mutex<Vec<String>>,
    pub received: Mutex<Vec<String>>,
    pub temperatures: Mutex<Vec<TemperatureReport>>,
    pub layers: Mutex<Vec<usize>>,
    pub errors: Mutex<Vec<String>>,
    pub starts: Mutex<Vec<bool>>,
    pub ends: Mutex<usize>,
    pub online: Mutex<usize>,
    pub disconnected: Mutex<usize>,
}

impl Recorder {
    pub fn attach(host: &HostController) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        host.add_listener(recorder.clone());
        recorder
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn layers(&self) -> Vec<usize> {
        self.layers.lock().unwrap().clone()
    }

    pub fn ends(&self) -> usize {
        *self.ends.lock().unwrap()
    }

    pub fn disconnects(&self) -> usize {
        *self.disconnected.lock().unwrap()
    }
}

impl PrintListener for Recorder {
    fn on_line_sent(&self, raw: &str, _command: &Command) {
        self.sent.lock().unwrap().push(raw.to_string());
    }

    fn on_line_received(&self, line: &str) {
        self.received.lock().unwrap().push(line.to_string());
    }

    fn on_temperature(&self, report: &TemperatureReport) {
        self.temperatures.lock().unwrap().push(report.clone());
    }

    fn on_print_start(&self, resume: bool) {
        self.starts.lock().unwrap().push(resume);
    }

    fn on_print_end(&self) {
        *self.ends.lock().unwrap() += 1;
    }

    fn on_layer_change(&self, layer: usize) {
        self.layers.lock().unwrap().push(layer);
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn on_online(&self) {
        *self.online.lock().unwrap() += 1;
    }

    fn on_disconnected(&self) {
        *self.disconnected.lock().unwrap() += 1;
    }
}

/// Short timeouts so failures surface quickly
pub fn fast_config() -> StreamConfig {
    StreamConfig {
        read_timeout: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
        handshake_empty_reads: 2,
        handshake_attempts: 3,
        write_failure_limit: 4,
        ..StreamConfig::default()
    }
}

pub fn document(lines: &[&str]) -> Arc<Document> {
    Arc::new(Document::from_lines(lines.iter().copied(), AnalyzerConfig::default()))
}

/// Poll `condition` until it holds or [`WAIT`] passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Payload of every written line, dropping handshake polls
pub fn payloads(written: &[String]) -> Vec<String> {
    written
        .iter()
        .filter(|line| line.as_str() != "M105")
        .map(|line| match split_frame(line) {
            Some((_, payload, _)) => payload.to_string(),
            None => line.clone(),
        })
        .collect()
}

/// Connected and online controller over `fake`
pub fn online_host(fake: &Arc<FakeController>, config: StreamConfig) -> HostController {
    let host = HostController::new(config);
    host.connect_with(fake.clone()).unwrap();
    assert!(host.wait_online(WAIT), "controller never came online");
    host
}
