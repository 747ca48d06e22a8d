//! Instrument communication handle.
//!
//! A [`Session`] owns exactly one [`Transport`] and turns its byte stream into
//! terminated text messages. All transport access goes through a single mutex,
//! so a [`Session::query`] is one critical section: parameters sharing a
//! session (through `Arc<Session>`) are serialized automatically and their
//! request/response pairs can never interleave. Longer sequences (a
//! parameter's pre-command, exchange and post-command) hold the lock through a
//! [`Transaction`].
//!
//! Reads wait in short slices of [`POLL_INTERVAL`], re-checking the deadline
//! and the closed flag between slices. Closing a session from another thread
//! therefore unblocks an in-flight read within one poll interval.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapters::{SimAdapter, SocketAdapter, Transport};
use crate::error::{CommunicationError, ParamError, ParamResult};
use crate::sim::{find_subsequence, SimDescription, DEFAULT_DESCRIPTION};

/// Timeout used when [`SessionConfig::timeout`] is `None`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of blocking reads.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

const READ_CHUNK: usize = 1024;

/// Connection options for a [`Session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Read/query timeout; `None` selects [`DEFAULT_TIMEOUT`].
    pub timeout: Option<Duration>,
    /// Terminator expected at the end of every response. Empty means none.
    pub read_termination: String,
    /// Terminator appended to every command. Empty means none.
    pub write_termination: String,
    /// Clear the device right after opening.
    pub device_clear: bool,
    /// Baud rate for serial resources.
    pub baud_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            read_termination: "\n".to_string(),
            write_termination: "\n".to_string(),
            device_clear: true,
            baud_rate: 9600,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set both terminations at once.
    pub fn with_termination(mut self, termination: &str) -> Self {
        self.read_termination = termination.to_string();
        self.write_termination = termination.to_string();
        self
    }

    pub fn with_read_termination(mut self, termination: &str) -> Self {
        self.read_termination = termination.to_string();
        self
    }

    pub fn with_write_termination(mut self, termination: &str) -> Self {
        self.write_termination = termination.to_string();
        self
    }

    pub fn with_device_clear(mut self, device_clear: bool) -> Self {
        self.device_clear = device_clear;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Which implementation serves a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Real transport chosen from the resource class.
    #[default]
    Default,
    /// Simulated instrument; `None` uses the description bundled with the crate.
    Simulated(Option<PathBuf>),
}

const SIM_SUFFIX: &str = "@sim";
const NATIVE_SELECTORS: [&str; 3] = ["@ni", "@ivi", "@py"];

impl Backend {
    /// Parse a backend selector string.
    ///
    /// | selector                     | backend                  |
    /// |------------------------------|--------------------------|
    /// | `""`, `@ni`, `@ivi`, `@py`   | `Default`                |
    /// | `@sim`                       | `Simulated(None)`        |
    /// | `path@sim`, `*.yaml`, `*.yml`| `Simulated(Some(path))`  |
    pub fn parse(selector: &str) -> ParamResult<Self> {
        let selector = selector.trim();
        let lower = selector.to_ascii_lowercase();
        if lower.is_empty() || NATIVE_SELECTORS.contains(&lower.as_str()) {
            return Ok(Backend::Default);
        }
        if lower == SIM_SUFFIX {
            return Ok(Backend::Simulated(None));
        }
        if lower.ends_with(SIM_SUFFIX) {
            let path = &selector[..selector.len() - SIM_SUFFIX.len()];
            return Ok(Backend::Simulated(Some(PathBuf::from(path))));
        }
        if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            return Ok(Backend::Simulated(Some(PathBuf::from(selector))));
        }
        Err(ParamError::Usage(format!("unknown backend selector '{selector}'")))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(_))
    }
}

impl FromStr for Backend {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::parse(s)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Default => f.write_str("default"),
            Backend::Simulated(None) => f.write_str(SIM_SUFFIX),
            Backend::Simulated(Some(path)) => write!(f, "{}{SIM_SUFFIX}", path.display()),
        }
    }
}

/// Split a trailing backend selector (`ASRL1::INSTR@sim`) off a resource.
fn split_backend_suffix(resource: &str) -> (&str, Option<&str>) {
    match resource.rsplit_once('@') {
        Some((address, _)) => {
            let selector = &resource[address.len()..];
            let known = selector.eq_ignore_ascii_case(SIM_SUFFIX)
                || NATIVE_SELECTORS
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(selector));
            if known {
                (address, Some(selector))
            } else {
                (resource, None)
            }
        }
        None => (resource, None),
    }
}

/// Resource classes a real transport exists for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Serial { port: String },
    Socket { host: String, port: u16 },
}

impl ResourceKind {
    pub(crate) fn parse(resource: &str) -> ParamResult<Self> {
        let parts: Vec<&str> = resource.split("::").collect();
        let class = parts.last().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        let board = parts[0];
        let board_upper = board.to_ascii_uppercase();

        if board_upper.starts_with("ASRL") && parts.len() == 2 && class == "INSTR" {
            let port = &board[4..];
            if port.is_empty() {
                return Err(ParamError::connection(resource, "serial resource without a port"));
            }
            let port = match port.parse::<u32>() {
                Ok(n) => serial_port_name(n),
                Err(_) => port.to_string(),
            };
            return Ok(ResourceKind::Serial { port });
        }

        if board_upper.starts_with("TCPIP") && parts.len() == 4 && class == "SOCKET" {
            let port = parts[2].parse::<u16>().map_err(|_| {
                ParamError::connection(resource, format!("invalid socket port '{}'", parts[2]))
            })?;
            return Ok(ResourceKind::Socket {
                host: parts[1].to_string(),
                port,
            });
        }

        Err(ParamError::connection(
            resource,
            "unsupported resource class (serial ASRL and TCPIP SOCKET resources are supported)",
        ))
    }
}

#[cfg(windows)]
fn serial_port_name(number: u32) -> String {
    format!("COM{number}")
}

#[cfg(not(windows))]
fn serial_port_name(number: u32) -> String {
    format!("/dev/ttyS{}", number.saturating_sub(1))
}

fn open_transport(resource: &str, config: &SessionConfig) -> ParamResult<Box<dyn Transport>> {
    match ResourceKind::parse(resource)? {
        ResourceKind::Serial { port } => open_serial(resource, &port, config),
        ResourceKind::Socket { host, port } => {
            SocketAdapter::connect(&host, port, config.effective_timeout())
                .map(|adapter| Box::new(adapter) as Box<dyn Transport>)
                .map_err(|e| ParamError::connection(resource, e.to_string()))
        }
    }
}

#[cfg(feature = "instrument_serial")]
fn open_serial(
    resource: &str,
    port: &str,
    config: &SessionConfig,
) -> ParamResult<Box<dyn Transport>> {
    crate::adapters::SerialAdapter::open(port, config.baud_rate)
        .map(|adapter| Box::new(adapter) as Box<dyn Transport>)
        .map_err(|e| ParamError::connection(resource, format!("{port}: {e}")))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial(
    resource: &str,
    _port: &str,
    _config: &SessionConfig,
) -> ParamResult<Box<dyn Transport>> {
    Err(ParamError::connection(
        resource,
        "serial support not enabled (feature `instrument_serial`)",
    ))
}

fn open_simulated(resource: &str, path: Option<&PathBuf>) -> ParamResult<Box<dyn Transport>> {
    let description = match path {
        Some(path) => SimDescription::load(path)?,
        None => SimDescription::from_yaml(DEFAULT_DESCRIPTION)?,
    };
    let device = description
        .instantiate(resource)
        .map_err(|e| ParamError::connection(resource, e.to_string()))?;
    Ok(Box::new(SimAdapter::new(device)))
}

struct Link {
    transport: Option<Box<dyn Transport>>,
    /// Bytes received past the last terminator.
    pending: Vec<u8>,
}

/// An open connection to one instrument.
pub struct Session {
    resource: String,
    backend: Backend,
    config: SessionConfig,
    link: Mutex<Link>,
    closed: AtomicBool,
}

impl Session {
    /// Open `resource` through `backend`.
    ///
    /// A backend suffix on the resource (`ASRL1::INSTR@sim`) is honored when
    /// `backend` is [`Backend::Default`].
    pub fn open(resource: &str, backend: Backend, config: SessionConfig) -> ParamResult<Self> {
        let (address, suffix) = split_backend_suffix(resource);
        let backend = match (backend, suffix) {
            (Backend::Default, Some(selector)) => Backend::parse(selector)?,
            (backend, _) => backend,
        };

        let transport = match &backend {
            Backend::Default => open_transport(address, &config)?,
            Backend::Simulated(path) => open_simulated(address, path.as_ref())?,
        };

        let device_clear = config.device_clear;
        let transport_info = transport.info();
        let session = Self::assemble(address, backend, transport, config);
        if device_clear {
            session
                .clear()
                .map_err(|e| ParamError::connection(address, format!("device clear failed: {e}")))?;
        }
        info!(
            resource = %session.resource,
            backend = %session.backend,
            transport = %transport_info,
            "session opened"
        );
        Ok(session)
    }

    /// Wrap an already connected transport. No device clear is performed.
    pub fn with_transport(
        resource: &str,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        debug!(resource, transport = %transport.info(), "session adopted transport");
        let session = Self::assemble(resource, Backend::Default, transport, config);
        session
    }

    fn assemble(
        resource: &str,
        backend: Backend,
        transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            resource: resource.to_string(),
            backend,
            config,
            link: Mutex::new(Link {
                transport: Some(transport),
                pending: Vec::new(),
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.config.effective_timeout()
    }

    pub fn read_termination(&self) -> &str {
        &self.config.read_termination
    }

    pub fn write_termination(&self) -> &str {
        &self.config.write_termination
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> ParamError {
        ParamError::connection(&self.resource, "session is closed")
    }

    fn lock(&self) -> ParamResult<MutexGuard<'_, Link>> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed while we waited for the lock.
        if !self.is_open() || link.transport.is_none() {
            return Err(self.closed_error());
        }
        Ok(link)
    }

    fn transport<'a>(&self, link: &'a mut Link) -> ParamResult<&'a mut Box<dyn Transport>> {
        match link.transport.as_mut() {
            Some(transport) => Ok(transport),
            None => Err(self.closed_error()),
        }
    }

    fn send(&self, link: &mut Link, payload: &[u8]) -> ParamResult<()> {
        self.transport(link)?
            .write_all(payload)
            .map_err(|e| ParamError::from(CommunicationError::Transport(e)))
    }

    fn send_command(&self, link: &mut Link, command: &str) -> ParamResult<()> {
        debug!(resource = %self.resource, %command, "write");
        let mut frame = Vec::with_capacity(command.len() + self.config.write_termination.len());
        frame.extend_from_slice(command.as_bytes());
        frame.extend_from_slice(self.config.write_termination.as_bytes());
        self.send(link, &frame)
    }

    /// Block until one response frame is available, the timeout elapses or
    /// the session is closed. Partial data is discarded on failure.
    fn receive(&self, link: &mut Link) -> ParamResult<Vec<u8>> {
        let timeout = self.timeout();
        let deadline = Instant::now() + timeout;
        let termination = self.config.read_termination.as_bytes();
        let mut chunk = [0u8; READ_CHUNK];
        let mut received = !link.pending.is_empty();

        loop {
            if let Some(pos) = find_subsequence(&link.pending, termination) {
                let mut frame: Vec<u8> = link.pending.drain(..pos + termination.len()).collect();
                frame.truncate(pos);
                return Ok(frame);
            }
            if !self.is_open() {
                link.pending.clear();
                return Err(ParamError::connection(
                    &self.resource,
                    "session closed during read",
                ));
            }
            let now = Instant::now();
            if now >= deadline {
                if !link.pending.is_empty() {
                    warn!(
                        resource = %self.resource,
                        discarded = link.pending.len(),
                        "read timed out with partial data"
                    );
                }
                link.pending.clear();
                return Err(CommunicationError::Timeout { timeout }.into());
            }

            let poll = POLL_INTERVAL.min(deadline - now);
            let read = self.transport(link)?.read_available(&mut chunk, poll);
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    link.pending.clear();
                    return Err(CommunicationError::Transport(e).into());
                }
            };
            if n == 0 {
                // Without a terminator a quiet line ends the message.
                if termination.is_empty() && received {
                    return Ok(std::mem::take(&mut link.pending));
                }
                continue;
            }
            link.pending.extend_from_slice(&chunk[..n]);
            received = true;
        }
    }

    fn receive_text(&self, link: &mut Link) -> ParamResult<String> {
        let frame = self.receive(link)?;
        let text = String::from_utf8(frame).map_err(|e| {
            CommunicationError::Malformed(format!("response is not valid UTF-8: {e}"))
        })?;
        debug!(resource = %self.resource, response = %text, "read");
        Ok(text)
    }

    /// Lock the session for a sequence of exchanges.
    ///
    /// No other caller can reach the instrument until the returned
    /// [`Transaction`] is dropped.
    pub fn transaction(&self) -> ParamResult<Transaction<'_>> {
        Ok(Transaction {
            session: self,
            link: self.lock()?,
        })
    }

    /// Send `command` followed by the write termination. Does not wait for a reply.
    pub fn write(&self, command: &str) -> ParamResult<()> {
        self.transaction()?.write(command)
    }

    /// Send `data` verbatim, without termination.
    pub fn write_raw(&self, data: &[u8]) -> ParamResult<()> {
        self.transaction()?.write_raw(data)
    }

    /// Read one response with the read termination stripped.
    pub fn read(&self) -> ParamResult<String> {
        self.transaction()?.read()
    }

    /// Read one response frame as bytes.
    pub fn read_raw(&self) -> ParamResult<Vec<u8>> {
        self.transaction()?.read_raw()
    }

    /// Write `command` and read its response as one atomic exchange.
    pub fn query(&self, command: &str) -> ParamResult<String> {
        self.transaction()?.query(command)
    }

    /// Like [`Session::query`], sleeping `delay` between write and read.
    pub fn query_with_delay(&self, command: &str, delay: Duration) -> ParamResult<String> {
        self.transaction()?.query_with_delay(command, delay)
    }

    /// Discard buffered input and clear the device.
    pub fn clear(&self) -> ParamResult<()> {
        let mut link = self.lock()?;
        link.pending.clear();
        debug!(resource = %self.resource, "clear");
        self.transport(&mut link)?
            .clear()
            .map_err(|e| CommunicationError::Transport(e).into())
    }

    /// Close the session. Calling it again is a no-op.
    pub fn close(&self) -> ParamResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // An in-flight read notices the flag and releases the lock.
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.pending.clear();
        let result = match link.transport.take() {
            Some(mut transport) => transport.close(),
            None => Ok(()),
        };
        info!(resource = %self.resource, "session closed");
        result.map_err(|e| CommunicationError::Transport(e).into())
    }
}

/// Exclusive access to a [`Session`], from [`Session::transaction`].
pub struct Transaction<'a> {
    session: &'a Session,
    link: MutexGuard<'a, Link>,
}

impl Transaction<'_> {
    pub fn write(&mut self, command: &str) -> ParamResult<()> {
        self.session.send_command(&mut self.link, command)
    }

    pub fn write_raw(&mut self, data: &[u8]) -> ParamResult<()> {
        debug!(resource = %self.session.resource, bytes = data.len(), "write raw");
        self.session.send(&mut self.link, data)
    }

    pub fn read(&mut self) -> ParamResult<String> {
        self.session.receive_text(&mut self.link)
    }

    pub fn read_raw(&mut self) -> ParamResult<Vec<u8>> {
        self.session.receive(&mut self.link)
    }

    pub fn query(&mut self, command: &str) -> ParamResult<String> {
        self.query_with_delay(command, Duration::ZERO)
    }

    pub fn query_with_delay(&mut self, command: &str, delay: Duration) -> ParamResult<String> {
        self.write(command)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.read()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(resource = %self.resource, error = %e, "error while closing session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("resource", &self.resource)
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish()
    }
}
