//! Instrument address resolution.
//!
//! Users name an instrument either by its IPv4 address (LAN/LXI) or by its
//! GPIB primary address. [`resolve`] turns that into the VISA resource string
//! handed to a [`ResourceManager`](crate::adapters::ResourceManager):
//!
//! | Input | Resource |
//! |---|---|
//! | `"192.168.1.10"` | `TCPIP0::192.168.1.10::inst0::INSTR` |
//! | `19` | `GPIB0::19::INSTR` |
//!
//! Strings are never interpreted as GPIB addresses, so `"19"` is rejected.

use crate::error::{InstrumentError, InstrumentResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::warn;

/// Highest GPIB primary address.
pub const GPIB_MAX_PRIMARY_ADDRESS: i64 = 30;

/// A user-supplied instrument address, as written in a config file or on the
/// command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstrumentAddress {
    /// GPIB primary address candidate.
    Integer(i64),
    /// Never valid; kept so that config values like `19.0` are rejected with a clear error.
    Float(f64),
    /// IPv4 literal candidate.
    Text(String),
    /// Never valid.
    Flag(bool),
}

impl InstrumentAddress {
    /// Human-readable name of the input kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            InstrumentAddress::Integer(_) => "integer",
            InstrumentAddress::Float(_) => "float",
            InstrumentAddress::Text(_) => "string",
            InstrumentAddress::Flag(_) => "boolean",
        }
    }
}

impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentAddress::Integer(n) => write!(f, "{n}"),
            InstrumentAddress::Float(x) => write!(f, "{x}"),
            InstrumentAddress::Text(s) => f.write_str(s),
            InstrumentAddress::Flag(b) => write!(f, "{b}"),
        }
    }
}

/// Parses command-line input: integers become GPIB candidates, anything else
/// numeric is a float, everything else is text.
impl FromStr for InstrumentAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            Ok(InstrumentAddress::Integer(n))
        } else if let Ok(x) = s.parse::<f64>() {
            Ok(InstrumentAddress::Float(x))
        } else {
            Ok(InstrumentAddress::Text(s.to_string()))
        }
    }
}

impl From<&str> for InstrumentAddress {
    fn from(s: &str) -> Self {
        InstrumentAddress::Text(s.to_string())
    }
}

impl From<String> for InstrumentAddress {
    fn from(s: String) -> Self {
        InstrumentAddress::Text(s)
    }
}

impl From<Ipv4Addr> for InstrumentAddress {
    fn from(ip: Ipv4Addr) -> Self {
        InstrumentAddress::Text(ip.to_string())
    }
}

impl From<i64> for InstrumentAddress {
    fn from(n: i64) -> Self {
        InstrumentAddress::Integer(n)
    }
}

impl From<i32> for InstrumentAddress {
    fn from(n: i32) -> Self {
        InstrumentAddress::Integer(n.into())
    }
}

impl From<u8> for InstrumentAddress {
    fn from(n: u8) -> Self {
        InstrumentAddress::Integer(n.into())
    }
}

impl From<f64> for InstrumentAddress {
    fn from(x: f64) -> Self {
        InstrumentAddress::Float(x)
    }
}

impl From<bool> for InstrumentAddress {
    fn from(b: bool) -> Self {
        InstrumentAddress::Flag(b)
    }
}

/// A VISA resource string, e.g. `GPIB0::19::INSTR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap an already-formed resource string without validation.
    pub fn from_raw(resource: impl Into<String>) -> Self {
        Self(resource.into())
    }

    /// The resource string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this resource goes over LAN.
    pub fn is_lan(&self) -> bool {
        self.0.starts_with("TCPIP")
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a user-supplied address into a VISA resource string.
///
/// # Errors
///
/// - [`InstrumentError::InvalidAddress`] for a string that is not an IPv4
///   literal, or an integer outside `0..=30`.
/// - [`InstrumentError::UnsupportedAddressKind`] for any other input kind.
pub fn resolve(address: &InstrumentAddress) -> InstrumentResult<ResourceId> {
    match address {
        InstrumentAddress::Text(text) => match text.parse::<Ipv4Addr>() {
            Ok(ip) => Ok(ResourceId(format!("TCPIP0::{ip}::inst0::INSTR"))),
            Err(_) => {
                warn!(address = %text, "Not a valid IPv4 address");
                Err(InstrumentError::InvalidAddress(format!(
                    "'{text}' is not a valid IPv4 address"
                )))
            }
        },
        InstrumentAddress::Integer(n) => {
            if (0..=GPIB_MAX_PRIMARY_ADDRESS).contains(n) {
                Ok(ResourceId(format!("GPIB0::{n}::INSTR")))
            } else {
                warn!(address = n, "Not a valid GPIB primary address");
                Err(InstrumentError::InvalidAddress(format!(
                    "{n} is not a GPIB primary address (0-{GPIB_MAX_PRIMARY_ADDRESS})"
                )))
            }
        }
        other => Err(InstrumentError::UnsupportedAddressKind(
            other.kind().to_string(),
        )),
    }
}
