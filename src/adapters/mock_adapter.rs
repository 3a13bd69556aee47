//! In-memory signal generator for tests and dry runs.
//!
//! [`MockInstrument`] plays the role of both the resource manager and the
//! instrument: it answers the IEEE 488.2 common queries and the diagnostic and
//! source subsystems used by the session, keeps the settable state so that a
//! write followed by a query round-trips, and records every line it receives.
//!
//! Handles are cheap clones sharing one state, so a test can keep a handle
//! after passing another to [`InstrumentSession::open`] and inspect the command
//! log afterwards.
//!
//! [`InstrumentSession::open`]: crate::instrument::InstrumentSession::open

use super::{ResourceManager, Transport, TransportOptions};
use crate::error::TransportError;
use crate::instrument::ResourceId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

const DEFAULT_IDN: &str = "Agilent Technologies, E4438C, MY45091234, C.05.83";
const DEFAULT_BOARDS: &str =
    "\"CPU,E4400-60538,MY45000101,A.01,OK\",\"Synthesizer,E4400-60537,MY45000102,B.03,OK\"";
const DEFAULT_OPTIONS: &str = "\"1E5,A.01,N/A\",\"UNT,A.02,3.1\"";

#[derive(Debug)]
struct MockState {
    identity: String,
    boards: String,
    options: String,
    opc_response: String,
    overrides: HashMap<String, String>,
    failing: HashSet<String>,
    fail_open: bool,
    fail_close: bool,

    frequency_hz: f64,
    power_dbm: f64,
    output: bool,
    modulation: bool,
    phase_continuous: bool,
    phase_deg: f64,

    log: Vec<String>,
    received_at: Vec<Instant>,
    query_delays: Vec<(String, Duration)>,
    opened: Vec<String>,
    close_count: usize,
}

impl MockState {
    fn preset(&mut self) {
        self.frequency_hz = 1.0e9;
        self.power_dbm = -135.0;
        self.output = false;
        self.modulation = true;
        self.phase_continuous = false;
        self.phase_deg = 0.0;
    }
}

impl Default for MockState {
    fn default() -> Self {
        let mut state = Self {
            identity: DEFAULT_IDN.to_string(),
            boards: DEFAULT_BOARDS.to_string(),
            options: DEFAULT_OPTIONS.to_string(),
            opc_response: "1".to_string(),
            overrides: HashMap::new(),
            failing: HashSet::new(),
            fail_open: false,
            fail_close: false,
            frequency_hz: 0.0,
            power_dbm: 0.0,
            output: false,
            modulation: false,
            phase_continuous: false,
            phase_deg: 0.0,
            log: Vec::new(),
            received_at: Vec::new(),
            query_delays: Vec::new(),
            opened: Vec::new(),
            close_count: 0,
        };
        state.preset();
        state
    }
}

/// A simulated signal generator reachable through [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
}

impl MockInstrument {
    /// Create a mock E4438C with the `UNT` option installed.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the raw `*IDN?` response.
    pub fn with_identity(self, idn: &str) -> Self {
        self.lock().identity = idn.to_string();
        self
    }

    /// Set the raw `:DIAGnostic:INFOrmation:BOARds?` response.
    pub fn with_boards(self, boards: &str) -> Self {
        self.lock().boards = boards.to_string();
        self
    }

    /// Set the raw `:DIAGnostic:INFOrmation:OPTions:DETail?` response.
    pub fn with_options(self, options: &str) -> Self {
        self.lock().options = options.to_string();
        self
    }

    /// Answer `query` with `response` instead of the simulated value.
    pub fn with_response(self, query: &str, response: &str) -> Self {
        self.lock()
            .overrides
            .insert(query.to_string(), response.to_string());
        self
    }

    /// Fail every write or query whose header is `command` with an I/O error.
    pub fn failing_on(self, command: &str) -> Self {
        self.lock().failing.insert(command.to_string());
        self
    }

    /// Make `open_resource` fail.
    pub fn refusing_connections(self) -> Self {
        self.lock().fail_open = true;
        self
    }

    /// Start failing `command` from now on, e.g. after the handshake went through.
    pub fn start_failing(&self, command: &str) {
        self.lock().failing.insert(command.to_string());
    }

    /// Make closing a transport report an error. The transport still counts as closed.
    pub fn start_failing_close(&self) {
        self.lock().fail_close = true;
    }

    /// Change the `*OPC?` response for subsequent confirmations.
    pub fn set_opc_response(&self, response: &str) {
        self.lock().opc_response = response.to_string();
    }

    /// Change the simulated CW frequency behind the session's back.
    pub fn set_frequency(&self, hz: f64) {
        self.lock().frequency_hz = hz;
    }

    /// Every line received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of received lines equal to `command`.
    pub fn count(&self, command: &str) -> usize {
        self.lock().log.iter().filter(|c| c.as_str() == command).count()
    }

    /// Every query received so far with the settle delay it was given.
    pub fn query_delays(&self) -> Vec<(String, Duration)> {
        self.lock().query_delays.clone()
    }

    /// Time between receiving the first `command` and the line after it.
    pub fn gap_after(&self, command: &str) -> Option<Duration> {
        let state = self.lock();
        let index = state.log.iter().position(|c| c.as_str() == command)?;
        let next = state.received_at.get(index + 1)?;
        Some(next.duration_since(state.received_at[index]))
    }

    /// Forget the command log.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.log.clear();
        state.received_at.clear();
        state.query_delays.clear();
    }

    /// Resource strings passed to `open_resource`.
    pub fn opened_resources(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Number of times a transport was closed.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }
}

impl ResourceManager for MockInstrument {
    type Transport = MockTransport;

    fn open_resource(
        &self,
        resource: &ResourceId,
        _options: &TransportOptions,
    ) -> Result<MockTransport, TransportError> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(TransportError::Visa(format!(
                "VI_ERROR_RSRC_NFOUND: {resource}"
            )));
        }
        state.opened.push(resource.to_string());
        Ok(MockTransport {
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

/// One open channel to a [`MockInstrument`].
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockTransport {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receive(&self, line: &str) -> Result<MutexGuard<'_, MockState>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut state = self.lock();
        state.log.push(line.to_string());
        state.received_at.push(Instant::now());
        let header = line.split_whitespace().next().unwrap_or_default();
        if state.failing.contains(header) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("simulated failure on '{header}'"),
            )));
        }
        Ok(state)
    }
}

fn parse_number(argument: &str, unit: &str) -> Option<f64> {
    let trimmed = argument.trim();
    let number = trimmed
        .strip_suffix(unit)
        .or_else(|| trimmed.strip_suffix(&unit.to_ascii_uppercase()))
        .unwrap_or(trimmed);
    number.trim().parse().ok()
}

fn parse_switch(argument: &str) -> Option<bool> {
    match argument.trim().to_ascii_lowercase().as_str() {
        "1" | "on" => Some(true),
        "0" | "off" => Some(false),
        _ => None,
    }
}

fn switch(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}

impl Transport for MockTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let mut state = self.receive(command)?;
        trace!(command, "mock write");
        let (header, argument) = command.split_once(' ').unwrap_or((command, ""));
        match header {
            "*RST" => state.preset(),
            "*CLS" => {}
            ":SOURce:FREQuency:CW" => {
                if let Some(hz) = parse_number(argument, "Hz") {
                    state.frequency_hz = hz;
                }
            }
            ":SOURce:POWer:LEVel:IMMediate:AMPlitude" => {
                if let Some(dbm) = parse_number(argument, "dBm") {
                    state.power_dbm = dbm;
                }
            }
            ":OUTPut:STATe" => {
                if let Some(on) = parse_switch(argument) {
                    state.output = on;
                }
            }
            ":OUTPut:MODulation:STATe" => {
                if let Some(on) = parse_switch(argument) {
                    state.modulation = on;
                }
            }
            ":SOURce:FREQuency:CONTinuous:MODE" => {
                if let Some(on) = parse_switch(argument) {
                    state.phase_continuous = on;
                }
            }
            ":SOURce:PHASe:REFerence" => state.phase_deg = 0.0,
            ":SOURce:PHASe:ADJust" => {
                if let Some(deg) = parse_number(argument, "DEG") {
                    state.phase_deg = deg;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn query(&mut self, command: &str, delay: Duration) -> Result<String, TransportError> {
        let mut state = self.receive(command)?;
        state.query_delays.push((command.to_string(), delay));
        if let Some(response) = state.overrides.get(command) {
            return Ok(response.clone());
        }
        let response = match command {
            "*OPC?" => state.opc_response.clone(),
            "*IDN?" => state.identity.clone(),
            ":DIAGnostic:INFOrmation:BOARds?" => state.boards.clone(),
            ":DIAGnostic:INFOrmation:OPTions:DETail?" => state.options.clone(),
            ":DIAGnostic:INFOrmation:SDATe?" => "\"2009-03-10 13:45\"".to_string(),
            ":DIAGnostic:INFOrmation:OTIMe?" => "12345".to_string(),
            ":DIAGnostic:INFOrmation:CCOunt:ATTenuator?" => "321".to_string(),
            ":DIAGnostic:INFOrmation:CCOunt:PON?" => "789".to_string(),
            ":SOURce:FREQuency:CW?" => format!("{:E}", state.frequency_hz),
            ":SOURce:POWer:LEVel:IMMediate:AMPlitude?" => format!("{:E}", state.power_dbm),
            ":OUTPut:STATe?" => switch(state.output),
            ":OUTPut:MODulation:STATe?" => switch(state.modulation),
            ":SOURce:FREQuency:CONTinuous:MODE?" => switch(state.phase_continuous),
            ":SOURce:PHASe:ADJust?" => format!("{:E}", state.phase_deg.to_radians()),
            _ => {
                return Err(TransportError::Timeout {
                    command: command.to_string(),
                    timeout_ms: 0,
                })
            }
        };
        trace!(command, %response, "mock query");
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        let mut state = self.lock();
        state.close_count += 1;
        if state.fail_close {
            return Err(TransportError::Visa("VI_ERROR_CONN_LOST".to_string()));
        }
        Ok(())
    }
}
