//! Mock transport for testing
//!
//! This adapter implements [`Transport`] for testing parameters without
//! physical hardware. It provides:
//! - Canned replies keyed by command text
//! - Simulated response latency
//! - One-shot failure injection
//! - A shared log of every write for verification
//!
//! The adapter itself moves into the session, so tests keep a [`MockLog`]
//! handle to inspect and steer it afterwards.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::Transport;

#[derive(Debug, Default)]
struct MockState {
    writes: Vec<String>,
    responses: HashMap<String, String>,
    output: VecDeque<u8>,
    ready_at: Option<Instant>,
    fail_next: bool,
    clears: usize,
    closed: bool,
}

/// Shared view of a [`MockAdapter`] that outlives the session owning it.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<MockState>>);

impl MockLog {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every message written so far, terminators stripped.
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    pub fn clear_count(&self) -> usize {
        self.state().clears
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Forget recorded writes.
    pub fn clear_log(&self) {
        self.state().writes.clear();
    }

    /// Reply `reply` whenever `command` is written.
    pub fn respond(&self, command: &str, reply: &str) {
        self.state()
            .responses
            .insert(command.to_string(), reply.to_string());
    }

    /// Queue raw bytes as if the instrument had sent them unprompted.
    pub fn push_output(&self, bytes: &[u8]) {
        self.state().output.extend(bytes);
    }

    /// Fail the next transport operation with a broken-pipe error.
    pub fn trigger_failure(&self) {
        self.state().fail_next = true;
    }
}

/// Mock transport answering from a table of canned replies.
///
/// # Example
///
/// ```
/// use daq_param::adapters::MockAdapter;
/// use daq_param::session::Session;
///
/// let adapter = MockAdapter::new().with_response("*IDN?", "ACME,MOCK,1,0.1");
/// let log = adapter.log();
/// let session = Session::with_transport("MOCK0::INSTR", Box::new(adapter), Default::default());
/// assert_eq!(session.query("*IDN?").unwrap(), "ACME,MOCK,1,0.1");
/// assert_eq!(log.writes(), vec!["*IDN?".to_string()]);
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    latency: Duration,
    response_termination: String,
    shared: MockLog,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            response_termination: "\n".to_string(),
            shared: MockLog::default(),
        }
    }

    /// Delay every reply by `ms` milliseconds.
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    pub fn with_response(self, command: &str, reply: &str) -> Self {
        self.shared.respond(command, reply);
        self
    }

    /// Terminator appended to canned replies (default `"\n"`).
    pub fn with_response_termination(mut self, termination: &str) -> Self {
        self.response_termination = termination.to_string();
        self
    }

    pub fn log(&self) -> MockLog {
        self.shared.clone()
    }

    fn check_failure(state: &mut MockState) -> io::Result<()> {
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock closed"));
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "Mock transport failure",
            ));
        }
        Ok(())
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockAdapter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.shared.state();
        Self::check_failure(&mut state)?;

        let text = String::from_utf8_lossy(data);
        let command = text.trim_end_matches(['\r', '\n']).to_string();
        debug!(%command, "mock write");
        if let Some(reply) = state.responses.get(&command).cloned() {
            state.output.extend(reply.as_bytes());
            state.output.extend(self.response_termination.as_bytes());
            state.ready_at = Some(Instant::now() + self.latency);
        }
        state.writes.push(command);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], poll: Duration) -> io::Result<usize> {
        let wait = {
            let mut state = self.shared.state();
            Self::check_failure(&mut state)?;
            let remaining = state
                .ready_at
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            if state.output.is_empty() || !remaining.is_zero() {
                Some(if state.output.is_empty() {
                    poll
                } else {
                    remaining.min(poll)
                })
            } else {
                let n = buf.len().min(state.output.len());
                for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        };
        // Sleep outside the lock so test code can inspect the log meanwhile.
        if let Some(wait) = wait {
            std::thread::sleep(wait);
        }
        Ok(0)
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut state = self.shared.state();
        Self::check_failure(&mut state)?;
        state.output.clear();
        state.ready_at = None;
        state.clears += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.shared.state().closed = true;
        Ok(())
    }

    fn info(&self) -> String {
        format!("MockAdapter (latency: {}ms)", self.latency.as_millis())
    }
}
