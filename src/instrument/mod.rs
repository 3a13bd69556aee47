//! Signal generator control.
//!
//! - [`address`]: user address → VISA resource string.
//! - [`identity`]: records parsed from the identify handshake.
//! - [`capabilities`]: option-dependent features.
//! - [`parameter`]: cached, confirmed parameter access.
//! - [`session`]: the [`InstrumentSession`] state machine tying them together.

pub mod address;
pub mod capabilities;
pub mod identity;
pub mod parameter;
pub mod session;

pub use address::{resolve, InstrumentAddress, ResourceId};
pub use capabilities::{CapabilityGate, Feature};
pub use identity::{BoardRecord, DiagnosticCounters, InstrumentIdentity, OptionRecord};
pub use parameter::{CachedField, Quantity, SwitchSetting, Unit};
pub use session::{HandshakeStep, InstrumentSession, SessionOptions, SessionState};
