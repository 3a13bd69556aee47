//! Hardware adapter implementations
//!
//! This module defines the command-channel seam between an
//! [`InstrumentSession`](crate::instrument::InstrumentSession) and the I/O
//! library that actually reaches the instrument:
//!
//! - [`ResourceManager`] opens a channel from a VISA resource string.
//! - [`Transport`] is one open, ordered, blocking request/response channel.
//!
//! Two implementations ship with the crate: [`VisaManager`] (a thin wrapper
//! over the `visa-rs` crate, behind the `instrument_visa` feature) and
//! [`MockInstrument`], an in-memory signal generator used by tests and the
//! `--mock` CLI mode.

use crate::error::TransportError;
use crate::instrument::ResourceId;
use std::time::Duration;

pub mod mock_adapter;
pub mod visa_adapter;

pub use mock_adapter::{MockInstrument, MockTransport};
pub use visa_adapter::{VisaManager, VisaTransport};

/// Settings applied when a transport is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// I/O timeout for a single write or read.
    ///
    /// This is the only bound on `*OPC?`: the session adds no timeout of its own.
    pub timeout: Duration,
    /// Terminator expected at the end of every response line.
    pub read_termination: String,
    /// Terminator appended to every command line.
    pub write_termination: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            read_termination: "\n".to_string(),
            write_termination: "\n".to_string(),
        }
    }
}

/// An open, ordered, blocking command channel to a single instrument.
///
/// Every `query` must read exactly one response line so that later queries
/// stay aligned with the instrument's output queue.
pub trait Transport {
    /// Send a command that produces no response (e.g. `*RST`).
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Send a query and read its response line, waiting `delay` between the
    /// write and the read. The returned string has its terminator removed.
    fn query(&mut self, command: &str, delay: Duration) -> Result<String, TransportError>;

    /// Release the underlying resource. Called exactly once by the session.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports from resolved resource identifiers.
pub trait ResourceManager {
    /// The transport type produced by this manager.
    type Transport: Transport;

    /// Open a channel to `resource`.
    fn open_resource(
        &self,
        resource: &ResourceId,
        options: &TransportOptions,
    ) -> Result<Self::Transport, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str, delay: Duration) -> Result<String, TransportError> {
        (**self).query(command, delay)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}
