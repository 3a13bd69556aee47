//! Remote control session for a SCPI signal generator.
//!
//! An [`InstrumentSession`] owns one [`Transport`] for its whole life and walks
//! through a fixed set of states:
//!
//! ```text
//! Unopened ──open──▶ Resetting ──▶ Identifying ──▶ Ready ──close──▶ Closed
//!                         │              │
//!                         └──────────────┴──▶ Failed (transport released)
//! ```
//!
//! `open` resets the instrument, reads its identity, boards, options and usage
//! counters, and only then accepts parameter access. Any failure on the way
//! moves the session to `Failed`; it must then be discarded.
//!
//! All operations are blocking round trips separated by the settle delay. The
//! session adds no timeout of its own: each read is bounded by the transport's
//! I/O timeout ([`TransportOptions::timeout`]).
//!
//! # Example
//!
//! ```
//! use rf_siggen::adapters::MockInstrument;
//! use rf_siggen::instrument::{InstrumentSession, Quantity, SessionOptions};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), rf_siggen::error::InstrumentError> {
//! let generator = MockInstrument::new();
//! let options = SessionOptions {
//!     settle_delay: Duration::ZERO,
//!     ..SessionOptions::default()
//! };
//! let mut session = InstrumentSession::connect(&generator, "192.168.1.10", options)?;
//!
//! session.set_frequency(2.4e9)?;
//! session.set_power(-10.0)?;
//! session.set_output("on")?;
//! assert_eq!(session.frequency()?, Quantity::hertz(2.4e9));
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

use super::address::{self, InstrumentAddress, ResourceId};
use super::capabilities::{CapabilityGate, Feature};
use super::identity::{BoardRecord, DiagnosticCounters, InstrumentIdentity, OptionRecord};
use super::parameter::{
    validate_number, CachedField, Link, Quantity, Setting, SwitchSetting, FREQUENCY, MODULATION,
    OUTPUT, PHASE_ADJUSTMENT, PHASE_CONTINUOUS, PHASE_REFERENCE, POWER,
};
use crate::adapters::{ResourceManager, Transport, TransportOptions};
use crate::error::{InstrumentError, InstrumentResult, TransportError};
use std::fmt;
use std::time::Duration;
use tracing::{dispatcher, error, info, info_span, warn, Dispatch, Span};

const RESET_COMMAND: &str = "*RST";
const CLEAR_STATUS_COMMAND: &str = "*CLS";
const IDN_QUERY: &str = "*IDN?";
const BOARDS_QUERY: &str = ":DIAGnostic:INFOrmation:BOARds?";
const OPTIONS_QUERY: &str = ":DIAGnostic:INFOrmation:OPTions:DETail?";
const FIRMWARE_DATE_QUERY: &str = ":DIAGnostic:INFOrmation:SDATe?";
const POWER_ON_HOURS_QUERY: &str = ":DIAGnostic:INFOrmation:OTIMe?";
const ATTENUATOR_COUNT_QUERY: &str = ":DIAGnostic:INFOrmation:CCOunt:ATTenuator?";
const POWER_ON_COUNT_QUERY: &str = ":DIAGnostic:INFOrmation:CCOunt:PON?";

/// Default delay between VISA operations.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Address resolved, transport not opened yet.
    Unopened,
    /// Sending `*RST` / `*CLS`.
    Resetting,
    /// Reading identity, boards, options and counters.
    Identifying,
    /// Accepting parameter access.
    Ready,
    /// Closed gracefully.
    Closed,
    /// Handshake failed; the transport has been released.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unopened => "unopened",
            SessionState::Resetting => "resetting",
            SessionState::Identifying => "identifying",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        })
    }
}

/// Handshake step reported by [`InstrumentError::HandshakeFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    /// `*RST` / `*CLS`.
    Reset,
    /// `*IDN?`.
    Identify,
    /// Board enumeration.
    Boards,
    /// Option enumeration.
    Options,
    /// Firmware date and usage counters.
    Diagnostics,
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandshakeStep::Reset => "reset",
            HandshakeStep::Identify => "identify",
            HandshakeStep::Boards => "board enumeration",
            HandshakeStep::Options => "option enumeration",
            HandshakeStep::Diagnostics => "diagnostics",
        })
    }
}

fn failed_at(step: HandshakeStep) -> impl FnOnce(TransportError) -> InstrumentError {
    move |source| InstrumentError::HandshakeFailed { step, source }
}

/// Settings for a new session.
#[derive(Clone)]
pub struct SessionOptions {
    /// Alias identifying the instrument in logs.
    pub name: String,
    /// Delay after each write and between each query's write and read.
    pub settle_delay: Duration,
    /// Settings handed to the resource manager when opening.
    pub transport: TransportOptions,
    /// Where this session's log events go. `None` uses the dispatcher that is
    /// current when the session is created.
    pub log_sink: Option<Dispatch>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "SigGen".to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            transport: TransportOptions::default(),
            log_sink: None,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("name", &self.name)
            .field("settle_delay", &self.settle_delay)
            .field("transport", &self.transport)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Last known value of every settable parameter.
#[derive(Debug, Default)]
struct ParameterCache {
    frequency: CachedField<f64>,
    power: CachedField<f64>,
    output: CachedField<bool>,
    modulation: CachedField<bool>,
    phase_continuous: CachedField<bool>,
    phase_reference_zeroed: CachedField<bool>,
    phase_adjustment: CachedField<f64>,
}

impl ParameterCache {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Log events emitted while this guard lives go to the session's sink, inside
/// the session's span.
struct LogScope {
    _span: tracing::span::EnteredSpan,
    _dispatch: dispatcher::DefaultGuard,
}

/// A remote control session to one signal generator.
///
/// Not safe for concurrent use: every method takes `&mut self`. Share a session
/// across threads only behind a mutex.
pub struct InstrumentSession<T: Transport> {
    name: String,
    resource: ResourceId,
    state: SessionState,
    settle_delay: Duration,
    transport_options: TransportOptions,
    link: Option<Link<T>>,

    identity: Option<InstrumentIdentity>,
    boards: Vec<BoardRecord>,
    options: Vec<OptionRecord>,
    diagnostics: Option<DiagnosticCounters>,

    cache: ParameterCache,

    dispatch: Dispatch,
    span: Span,
}

impl<T: Transport> InstrumentSession<T> {
    /// Resolve `address` and create an unopened session. No I/O happens here.
    ///
    /// # Errors
    ///
    /// [`InstrumentError::InvalidAddress`] or
    /// [`InstrumentError::UnsupportedAddressKind`] from address resolution.
    pub fn new(
        address: impl Into<InstrumentAddress>,
        options: SessionOptions,
    ) -> InstrumentResult<Self> {
        let dispatch = options
            .log_sink
            .unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));

        let address = address.into();
        let (resource, span) = dispatcher::with_default(&dispatch, || {
            let resource = address::resolve(&address)?;
            let span = info_span!("instrument", name = %options.name, resource = %resource);
            Ok::<_, InstrumentError>((resource, span))
        })?;

        Ok(Self {
            name: options.name,
            resource,
            state: SessionState::Unopened,
            settle_delay: options.settle_delay,
            transport_options: options.transport,
            link: None,
            identity: None,
            boards: Vec::new(),
            options: Vec::new(),
            diagnostics: None,
            cache: ParameterCache::default(),
            dispatch,
            span,
        })
    }

    /// Resolve `address`, open it through `manager` and run the handshake.
    ///
    /// # Errors
    ///
    /// Any error from [`new`](Self::new) or [`open`](Self::open). The session
    /// is discarded on failure.
    pub fn connect<R>(
        manager: &R,
        address: impl Into<InstrumentAddress>,
        options: SessionOptions,
    ) -> InstrumentResult<Self>
    where
        R: ResourceManager<Transport = T>,
    {
        let mut session = Self::new(address, options)?;
        session.open(manager)?;
        Ok(session)
    }

    fn log_scope(&self) -> LogScope {
        let dispatch = dispatcher::set_default(&self.dispatch);
        LogScope {
            _span: self.span.clone().entered(),
            _dispatch: dispatch,
        }
    }

    /// Open the transport and run the reset/identify handshake.
    ///
    /// On any failure the transport is released and the session moves to
    /// [`SessionState::Failed`].
    ///
    /// # Errors
    ///
    /// - [`InstrumentError::TransportOpenFailed`] if the resource cannot be opened.
    /// - [`InstrumentError::HandshakeFailed`] if a handshake write or query fails.
    /// - [`InstrumentError::MalformedIdentity`],
    ///   [`InstrumentError::MalformedBoardRecord`] or
    ///   [`InstrumentError::MalformedOptionRecord`] for unparseable
    ///   self-description.
    pub fn open<R>(&mut self, manager: &R) -> InstrumentResult<()>
    where
        R: ResourceManager<Transport = T>,
    {
        let _log = self.log_scope();
        match self.state {
            SessionState::Unopened => {}
            SessionState::Failed => return Err(InstrumentError::SessionUnusable),
            SessionState::Closed => return Err(InstrumentError::AlreadyClosed),
            other => return Err(InstrumentError::NotReady(other)),
        }

        let transport = match manager.open_resource(&self.resource, &self.transport_options) {
            Ok(transport) => transport,
            Err(source) => {
                error!(error = %source, "Could not connect to instrument");
                self.state = SessionState::Failed;
                return Err(InstrumentError::TransportOpenFailed {
                    resource: self.resource.to_string(),
                    source,
                });
            }
        };
        info!("Established connection");
        self.link = Some(Link::new(transport, self.settle_delay));

        if let Err(err) = self.handshake() {
            error!(error = %err, state = %self.state, "Handshake failed");
            self.state = SessionState::Failed;
            if let Err(close_err) = self.release() {
                warn!(error = %close_err, "Error releasing transport after failed handshake");
            }
            return Err(err);
        }

        self.state = SessionState::Ready;
        info!("Session ready");
        Ok(())
    }

    fn handshake(&mut self) -> InstrumentResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(InstrumentError::NotReady(self.state));
        };

        self.state = SessionState::Resetting;
        link.write_settled(RESET_COMMAND)
            .and_then(|()| link.write_settled(CLEAR_STATUS_COMMAND))
            .map_err(failed_at(HandshakeStep::Reset))?;

        self.state = SessionState::Identifying;
        let idn = link
            .query(IDN_QUERY)
            .map_err(failed_at(HandshakeStep::Identify))?;
        let identity = InstrumentIdentity::parse(&idn)?;
        info!(
            vendor = %identity.vendor,
            model_number = %identity.model_number,
            serial_number = %identity.serial_number,
            firmware_version = %identity.firmware_version,
            "Instrument identified"
        );

        let response = link
            .query(BOARDS_QUERY)
            .map_err(failed_at(HandshakeStep::Boards))?;
        let boards = BoardRecord::parse_all(&response)?;
        for board in &boards {
            info!(
                board = %board.name,
                part_number = %board.part_number,
                serial_number = %board.serial_number,
                version_number = %board.version_number,
                status = %board.status,
                "Board"
            );
        }

        let response = link
            .query(OPTIONS_QUERY)
            .map_err(failed_at(HandshakeStep::Options))?;
        let options = OptionRecord::parse_all(&response)?;
        for option in &options {
            info!(
                option = %option.name,
                revision = %option.revision,
                dsp_version = %option.dsp_version,
                "Option"
            );
        }

        let diagnostics = Self::read_diagnostics(link, &identity, &options)
            .map_err(failed_at(HandshakeStep::Diagnostics))?;

        self.identity = Some(identity);
        self.boards = boards;
        self.options = options;
        self.diagnostics = Some(diagnostics);
        Ok(())
    }

    fn read_diagnostics(
        link: &mut Link<T>,
        identity: &InstrumentIdentity,
        options: &[OptionRecord],
    ) -> Result<DiagnosticCounters, TransportError> {
        let firmware_date = link.query(FIRMWARE_DATE_QUERY)?;
        info!(%firmware_date, "Firmware date and time stamp");

        let power_on_hours = link.query(POWER_ON_HOURS_QUERY)?;
        info!("Instrument has been on for {} hours", power_on_hours);

        let attenuator_switches =
            if CapabilityGate::new(identity, options).is_available(Feature::AttenuatorCounter) {
                let count = link.query(ATTENUATOR_COUNT_QUERY)?;
                info!(attenuator_switches = %count, "Attenuator switch count");
                Some(count)
            } else {
                None
            };

        let power_on_cycles = link.query(POWER_ON_COUNT_QUERY)?;
        info!("Instrument has been turned on {} times", power_on_cycles);

        Ok(DiagnosticCounters {
            firmware_date,
            power_on_hours,
            attenuator_switches,
            power_on_cycles,
        })
    }

    /// Close the session: log the power-on hours one last time, then release the
    /// transport.
    ///
    /// The transport is released even if the final query fails; that failure is
    /// still reported.
    ///
    /// # Errors
    ///
    /// - [`InstrumentError::AlreadyClosed`] on a second call.
    /// - [`InstrumentError::SessionUnusable`] after a failed handshake.
    /// - [`InstrumentError::NotReady`] if the session was never opened.
    pub fn close(&mut self) -> InstrumentResult<()> {
        let _log = self.log_scope();
        match self.state {
            SessionState::Ready => {}
            SessionState::Closed => return Err(InstrumentError::AlreadyClosed),
            SessionState::Failed => return Err(InstrumentError::SessionUnusable),
            other => return Err(InstrumentError::NotReady(other)),
        }

        info!("Closing connection");
        let hours = self
            .link
            .as_mut()
            .map(|link| link.query(POWER_ON_HOURS_QUERY));
        let released = self.release();
        self.state = SessionState::Closed;

        match hours {
            Some(Ok(hours)) => info!("Instrument has been on for {} hours", hours),
            Some(Err(err)) => {
                warn!(error = %err, "Could not read power-on hours before closing");
                if let Err(close_err) = released {
                    warn!(error = %close_err, "Error releasing transport");
                }
                return Err(err.into());
            }
            None => {}
        }
        released.map_err(Into::into)
    }

    /// Release the transport. Safe to call repeatedly; only the first call
    /// reaches the transport.
    fn release(&mut self) -> Result<(), TransportError> {
        match self.link.take() {
            Some(link) => {
                let result = link.close();
                info!("Transport released");
                result
            }
            None => Ok(()),
        }
    }

    fn ready(
        state: SessionState,
        link: &mut Option<Link<T>>,
    ) -> InstrumentResult<&mut Link<T>> {
        match state {
            SessionState::Ready => link.as_mut().ok_or(InstrumentError::NotReady(state)),
            SessionState::Closed => Err(InstrumentError::AlreadyClosed),
            SessionState::Failed => Err(InstrumentError::SessionUnusable),
            other => Err(InstrumentError::NotReady(other)),
        }
    }

    fn require<V>(&self, setting: &Setting<V>) -> InstrumentResult<()> {
        let Some(feature) = setting.feature else {
            return Ok(());
        };
        let Some(identity) = &self.identity else {
            return Err(InstrumentError::NotReady(self.state));
        };
        CapabilityGate::new(identity, &self.options)
            .require(feature)
            .inspect_err(|_| warn!(%feature, "Functionality not available"))
    }

    /// Ask `*OPC?` whether all pending operations are complete.
    ///
    /// Returns `true` only for an exact `1`. This acknowledges that the
    /// instrument processed the commands, not that the RF output changed.
    pub fn confirm(&mut self) -> InstrumentResult<bool> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        let (complete, _) = link.operation_complete()?;
        Ok(complete)
    }

    /// Reset the instrument to factory defaults (`*RST`, `*CLS`) and forget
    /// every cached value.
    pub fn reset(&mut self) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        // The instrument is no longer in the cached state once either write landed.
        self.cache.clear();
        link.write_settled(RESET_COMMAND)?;
        link.write_settled(CLEAR_STATUS_COMMAND)?;
        info!("Instrument reset to factory defaults");
        Ok(())
    }

    /// Forget every cached value so that the next reads query the instrument.
    ///
    /// The phase-reference marker survives: it records what this session did,
    /// not a value read back from the instrument.
    pub fn invalidate_cache(&mut self) {
        let zeroed = std::mem::take(&mut self.cache.phase_reference_zeroed);
        self.cache.clear();
        self.cache.phase_reference_zeroed = zeroed;
    }

    /// CW frequency.
    pub fn frequency(&mut self) -> InstrumentResult<Quantity> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        let hz = self.cache.frequency.read_through(link, &FREQUENCY)?;
        Ok(Quantity::hertz(hz))
    }

    /// Set the CW frequency in Hz.
    pub fn set_frequency(&mut self, hz: f64) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let hz = validate_number(FREQUENCY.name, hz, false)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.frequency.write_confirmed(link, &FREQUENCY, hz)
    }

    /// RF output power.
    pub fn power(&mut self) -> InstrumentResult<Quantity> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        let dbm = self.cache.power.read_through(link, &POWER)?;
        Ok(Quantity::dbm(dbm))
    }

    /// Set the RF output power in dBm.
    pub fn set_power(&mut self, dbm: f64) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let dbm = validate_number(POWER.name, dbm, true)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.power.write_confirmed(link, &POWER, dbm)
    }

    /// Whether the RF output is on.
    pub fn output_enabled(&mut self) -> InstrumentResult<bool> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.output.read_through(link, &OUTPUT)
    }

    /// Turn the RF output on or off.
    ///
    /// Accepts `0`/`1`, `"0"`/`"1"`, `"on"`/`"off"` (any case) or a `bool`.
    pub fn set_output(&mut self, state: impl Into<SwitchSetting>) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let on = state.into().to_bool(OUTPUT.name)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.output.write_confirmed(link, &OUTPUT, on)
    }

    /// Whether modulation is enabled. Requires [`Feature::Modulation`].
    pub fn modulation_enabled(&mut self) -> InstrumentResult<bool> {
        let _log = self.log_scope();
        Self::ready(self.state, &mut self.link)?;
        self.require(&MODULATION)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.modulation.read_through(link, &MODULATION)
    }

    /// Enable or disable modulation. Requires [`Feature::Modulation`].
    pub fn set_modulation(&mut self, state: impl Into<SwitchSetting>) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let on = state.into().to_bool(MODULATION.name)?;
        Self::ready(self.state, &mut self.link)?;
        self.require(&MODULATION)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache.modulation.write_confirmed(link, &MODULATION, on)
    }

    /// Whether phase-continuous fine sweep is on. Requires
    /// [`Feature::PhaseContinuous`].
    pub fn phase_continuous(&mut self) -> InstrumentResult<bool> {
        let _log = self.log_scope();
        Self::ready(self.state, &mut self.link)?;
        self.require(&PHASE_CONTINUOUS)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache
            .phase_continuous
            .read_through(link, &PHASE_CONTINUOUS)
    }

    /// Switch phase-continuous fine sweep. Requires [`Feature::PhaseContinuous`].
    pub fn set_phase_continuous(
        &mut self,
        state: impl Into<SwitchSetting>,
    ) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let on = state.into().to_bool(PHASE_CONTINUOUS.name)?;
        Self::ready(self.state, &mut self.link)?;
        self.require(&PHASE_CONTINUOUS)?;
        let link = Self::ready(self.state, &mut self.link)?;
        self.cache
            .phase_continuous
            .write_confirmed(link, &PHASE_CONTINUOUS, on)
    }

    /// Whether the output phase reference has been zeroed in this session.
    pub fn phase_reference_zeroed(&self) -> bool {
        self.cache.phase_reference_zeroed.get() == Some(&true)
    }

    /// Set the current output phase as the zero reference.
    pub fn zero_phase_reference(&mut self) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        Self::zero_phase(&mut self.cache, link)
    }

    fn zero_phase(cache: &mut ParameterCache, link: &mut Link<T>) -> InstrumentResult<()> {
        // The adjustment is relative to the reference, so any cached value is void.
        cache.phase_adjustment.clear();
        cache
            .phase_reference_zeroed
            .write_confirmed(link, &PHASE_REFERENCE, true)
    }

    fn ensure_phase_reference(
        cache: &mut ParameterCache,
        link: &mut Link<T>,
    ) -> InstrumentResult<()> {
        if cache.phase_reference_zeroed.get() == Some(&true) {
            return Ok(());
        }
        info!("Zeroing phase reference before first phase adjustment");
        Self::zero_phase(cache, link)
    }

    /// Phase adjustment of the output relative to the zeroed reference.
    ///
    /// Zeroes the phase reference first if that has not happened yet.
    pub fn phase_adjustment(&mut self) -> InstrumentResult<Quantity> {
        let _log = self.log_scope();
        let link = Self::ready(self.state, &mut self.link)?;
        Self::ensure_phase_reference(&mut self.cache, link)?;
        let degrees = self
            .cache
            .phase_adjustment
            .read_through(link, &PHASE_ADJUSTMENT)?;
        Ok(Quantity::degrees(degrees))
    }

    /// Set the phase adjustment in degrees.
    ///
    /// Zeroes the phase reference first if that has not happened yet; the
    /// adjustment is only written once the zeroing is confirmed.
    pub fn set_phase_adjustment(&mut self, degrees: f64) -> InstrumentResult<()> {
        let _log = self.log_scope();
        let degrees = validate_number(PHASE_ADJUSTMENT.name, degrees, true)?;
        let link = Self::ready(self.state, &mut self.link)?;
        Self::ensure_phase_reference(&mut self.cache, link)?;
        self.cache
            .phase_adjustment
            .write_confirmed(link, &PHASE_ADJUSTMENT, degrees)
    }

    /// Whether `feature` is available on this unit. Always `false` before the
    /// handshake completed.
    pub fn is_available(&self, feature: Feature) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| CapabilityGate::new(identity, &self.options).is_available(feature))
    }

    /// Alias used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved VISA resource string.
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Delay applied between operations.
    pub fn settle_delay(&self) -> Duration {
        self.link
            .as_ref()
            .map_or(self.settle_delay, Link::settle_delay)
    }

    /// Identity reported during the handshake.
    pub fn identity(&self) -> Option<&InstrumentIdentity> {
        self.identity.as_ref()
    }

    /// Boards reported during the handshake.
    pub fn boards(&self) -> &[BoardRecord] {
        &self.boards
    }

    /// Options reported during the handshake.
    pub fn options(&self) -> &[OptionRecord] {
        &self.options
    }

    /// Usage counters read during the handshake.
    pub fn diagnostics(&self) -> Option<&DiagnosticCounters> {
        self.diagnostics.as_ref()
    }

    /// Human-friendly summary of the connected instrument.
    pub fn details(&self) -> String {
        match &self.identity {
            Some(identity) => format!(
                "{} {} connected on {} with alias {}.\nSerial number: {}\nFirmware version: {}",
                identity.vendor,
                identity.model_number,
                self.resource,
                self.name,
                identity.serial_number,
                identity.firmware_version
            ),
            None => format!("{} on {} ({})", self.name, self.resource, self.state),
        }
    }
}

impl<T: Transport> fmt::Debug for InstrumentSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Drop for InstrumentSession<T> {
    fn drop(&mut self) {
        if self.link.is_none() {
            return;
        }
        let _log = self.log_scope();
        warn!(state = %self.state, "Session dropped without close; releasing transport");
        if let Err(err) = self.release() {
            warn!(error = %err, "Error releasing transport");
        }
    }
}
