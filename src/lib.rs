//! Remote control of SCPI signal generators.
//!
//! This library opens a command channel to a Keysight/Agilent E44xx/E82xx
//! class signal generator, runs the reset/identify handshake and exposes typed,
//! cached accessors for its output parameters. Every write is confirmed with
//! `*OPC?` before the cached value changes, and option-dependent controls are
//! gated on the options the instrument reports.
//!
//! - [`instrument`]: address resolution, session state machine, capabilities
//!   and parameters.
//! - [`adapters`]: the transport seam plus VISA and in-memory implementations.
//! - [`config`]: Figment-based configuration.
//! - [`logging`]: per-session log sinks.
//! - [`error`]: error types.

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;

pub use error::{InstrumentError, InstrumentResult, TransportError};
pub use instrument::{InstrumentSession, SessionOptions};
