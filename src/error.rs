//! Custom error types for instrument sessions.
//!
//! This module defines the two error types used throughout the crate, built with
//! the `thiserror` crate:
//!
//! - **`TransportError`**: failures of the command channel itself (I/O, timeout,
//!   VISA library errors). Transports return this type; the session never
//!   inspects it beyond wrapping it.
//! - **`InstrumentError`**: everything a caller of an [`InstrumentSession`] can
//!   observe, from local address/parameter validation through handshake failures
//!   to unconfirmed writes.
//!
//! ## Severity
//!
//! Errors fall into two groups, see [`InstrumentError::is_recoverable`]:
//!
//! - **Fatal**: `TransportOpenFailed`, `HandshakeFailed`, and malformed
//!   self-description during the handshake. The session moves to
//!   [`SessionState::Failed`] and must be discarded.
//! - **Recoverable**: local validation (`InvalidAddress`, `InvalidParameterValue`),
//!   capability checks (`FeatureNotLicensed`), steady-state parse failures
//!   (`MalformedResponse`), `WriteNotConfirmed` and steady-state `Transport`
//!   errors. These are reported per call and leave the session usable.
//!
//! [`InstrumentSession`]: crate::instrument::InstrumentSession
//! [`SessionState::Failed`]: crate::instrument::SessionState::Failed

use crate::instrument::{Feature, HandshakeStep, SessionState};
use thiserror::Error;

/// Convenience alias for results using the session error type.
pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// Errors raised by a [`Transport`](crate::adapters::Transport) implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {timeout_ms} ms waiting for response to '{command}'")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Transport is closed")]
    Closed,

    #[error("VISA error: {0}")]
    Visa(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    NotEnabled(String),
}

/// Errors reported by address resolution and instrument sessions.
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Invalid instrument address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported address kind '{0}': only IPv4 literals and GPIB primary addresses are supported")]
    UnsupportedAddressKind(String),

    #[error("Could not connect to '{resource}': {source}")]
    TransportOpenFailed {
        resource: String,
        #[source]
        source: TransportError,
    },

    #[error("Handshake failed during {step}: {source}")]
    HandshakeFailed {
        step: HandshakeStep,
        #[source]
        source: TransportError,
    },

    #[error("Malformed identity string '{0}': expected vendor,model,serial,firmware")]
    MalformedIdentity(String),

    #[error("Malformed board record '{0}': expected name,part,serial,version,status")]
    MalformedBoardRecord(String),

    #[error("Malformed option record '{0}': expected name,revision,dsp_version")]
    MalformedOptionRecord(String),

    #[error("Malformed response '{response}' to '{command}'")]
    MalformedResponse { command: String, response: String },

    #[error("Feature '{0}' is not available on this instrument")]
    FeatureNotLicensed(Feature),

    #[error("Invalid value '{value}' for {parameter}")]
    InvalidParameterValue {
        parameter: &'static str,
        value: String,
    },

    #[error("Instrument did not confirm '{command}' (*OPC? returned '{response}')")]
    WriteNotConfirmed { command: String, response: String },

    #[error("Session is already closed")]
    AlreadyClosed,

    #[error("Session is not ready (state: {0})")]
    NotReady(SessionState),

    #[error("Session is unusable after a failed handshake")]
    SessionUnusable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl InstrumentError {
    /// Whether the session stays usable after this error.
    ///
    /// Fatal errors (open and handshake failures) leave the session in
    /// [`SessionState::Failed`](crate::instrument::SessionState::Failed).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            InstrumentError::TransportOpenFailed { .. }
                | InstrumentError::HandshakeFailed { .. }
                | InstrumentError::MalformedIdentity(_)
                | InstrumentError::MalformedBoardRecord(_)
                | InstrumentError::MalformedOptionRecord(_)
                | InstrumentError::AlreadyClosed
                | InstrumentError::SessionUnusable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstrumentError::WriteNotConfirmed {
            command: ":OUTPut:STATe 1".to_string(),
            response: "0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Instrument did not confirm ':OUTPut:STATe 1' (*OPC? returned '0')"
        );
    }

    #[test]
    fn test_handshake_failed_carries_step() {
        let err = InstrumentError::HandshakeFailed {
            step: HandshakeStep::Identify,
            source: TransportError::Closed,
        };
        assert!(err.to_string().contains("identify"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(InstrumentError::FeatureNotLicensed(Feature::PhaseContinuous).is_recoverable());
        assert!(InstrumentError::InvalidAddress("31".into()).is_recoverable());
        assert!(InstrumentError::Transport(TransportError::Closed).is_recoverable());
        assert!(!InstrumentError::MalformedIdentity("a,b,c".into()).is_recoverable());
        assert!(!InstrumentError::SessionUnusable.is_recoverable());
    }
}
