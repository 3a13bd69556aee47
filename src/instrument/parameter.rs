//! Cached instrument parameters with confirmed writes.
//!
//! Every settable parameter of the generator follows the same protocol:
//!
//! - **Read**: return the cached value if there is one, otherwise query the
//!   instrument, parse, cache and return.
//! - **Write**: validate locally, send the set command, then ask `*OPC?`. Only a
//!   `1` acknowledgement updates the cache; anything else leaves the cache as it
//!   was and reports [`InstrumentError::WriteNotConfirmed`].
//!
//! The cache therefore only ever holds a value the instrument returned or
//! acknowledged. Nothing refreshes it in the background.

use super::capabilities::Feature;
use crate::adapters::Transport;
use crate::error::{InstrumentError, InstrumentResult, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Operation-complete query.
pub const OPC_QUERY: &str = "*OPC?";

/// Unit attached to a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Hertz.
    Hertz,
    /// Decibels relative to one milliwatt.
    DecibelMilliwatt,
    /// Degrees of phase.
    Degree,
}

impl Unit {
    /// SCPI suffix appended to values of this unit.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Hertz => "Hz",
            Unit::DecibelMilliwatt => "dBm",
            Unit::Degree => "DEG",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric parameter value together with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Numeric value.
    pub value: f64,
    /// Unit of `value`.
    pub unit: Unit,
}

impl Quantity {
    /// A frequency in Hz.
    pub fn hertz(value: f64) -> Self {
        Self {
            value,
            unit: Unit::Hertz,
        }
    }

    /// A power level in dBm.
    pub fn dbm(value: f64) -> Self {
        Self {
            value,
            unit: Unit::DecibelMilliwatt,
        }
    }

    /// A phase in degrees.
    pub fn degrees(value: f64) -> Self {
        Self {
            value,
            unit: Unit::Degree,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Input for an on/off parameter.
///
/// Accepted values are the integers `0`/`1` and the strings `"0"`, `"1"`,
/// `"on"`, `"off"` in any case. Rust `bool`s convert to `1`/`0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SwitchSetting {
    /// Integer form.
    Integer(i64),
    /// Never valid; kept so that `1.0` or `3.5` is rejected rather than truncated.
    Float(f64),
    /// Text form.
    Text(String),
}

impl SwitchSetting {
    /// Validate and convert to a boolean.
    pub fn to_bool(&self, parameter: &'static str) -> InstrumentResult<bool> {
        let parsed = match self {
            SwitchSetting::Integer(1) => Some(true),
            SwitchSetting::Integer(0) => Some(false),
            SwitchSetting::Text(text) => match text.to_ascii_lowercase().as_str() {
                "1" | "on" => Some(true),
                "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.ok_or_else(|| InstrumentError::InvalidParameterValue {
            parameter,
            value: self.to_string(),
        })
    }
}

impl fmt::Display for SwitchSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchSetting::Integer(n) => write!(f, "{n}"),
            SwitchSetting::Float(x) => write!(f, "{x}"),
            SwitchSetting::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for SwitchSetting {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i64>() {
            Ok(SwitchSetting::Integer(n))
        } else if let Ok(x) = s.parse::<f64>() {
            Ok(SwitchSetting::Float(x))
        } else {
            Ok(SwitchSetting::Text(s.to_string()))
        }
    }
}

impl From<bool> for SwitchSetting {
    fn from(on: bool) -> Self {
        SwitchSetting::Integer(i64::from(on))
    }
}

impl From<i64> for SwitchSetting {
    fn from(n: i64) -> Self {
        SwitchSetting::Integer(n)
    }
}

impl From<i32> for SwitchSetting {
    fn from(n: i32) -> Self {
        SwitchSetting::Integer(n.into())
    }
}

impl From<f64> for SwitchSetting {
    fn from(x: f64) -> Self {
        SwitchSetting::Float(x)
    }
}

impl From<&str> for SwitchSetting {
    fn from(s: &str) -> Self {
        SwitchSetting::Text(s.to_string())
    }
}

impl From<String> for SwitchSetting {
    fn from(s: String) -> Self {
        SwitchSetting::Text(s)
    }
}

/// Validate a numeric input before it is sent.
pub(crate) fn validate_number(
    parameter: &'static str,
    value: f64,
    allow_negative: bool,
) -> InstrumentResult<f64> {
    if value.is_finite() && (allow_negative || value >= 0.0) {
        Ok(value)
    } else {
        Err(InstrumentError::InvalidParameterValue {
            parameter,
            value: value.to_string(),
        })
    }
}

/// The instrument's last confirmed value of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedField<T> {
    value: Option<T>,
}

impl<T> Default for CachedField<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: Clone> CachedField<T> {
    /// An unpopulated field.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached value, if any.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Whether the field holds a value.
    pub fn is_populated(&self) -> bool {
        self.value.is_some()
    }

    /// Forget the cached value.
    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Return the cached value or fetch it with `setting`'s query.
    pub(crate) fn read_through<L: Transport>(
        &mut self,
        link: &mut Link<L>,
        setting: &Setting<T>,
    ) -> InstrumentResult<T> {
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }

        let query = setting.query();
        let response = link.query(&query)?;
        let value = (setting.decode)(&response).ok_or_else(|| {
            warn!(parameter = setting.name, %response, "Unparseable response");
            InstrumentError::MalformedResponse {
                command: query,
                response,
            }
        })?;
        self.value = Some(value.clone());
        Ok(value)
    }

    /// Send `value`, confirm it, and cache it only once confirmed.
    pub(crate) fn write_confirmed<L: Transport>(
        &mut self,
        link: &mut Link<L>,
        setting: &Setting<T>,
        value: T,
    ) -> InstrumentResult<()> {
        let command = setting.command(&value);
        link.write(&command)?;
        link.confirm(&command)?;
        info!(parameter = setting.name, %command, "Parameter set");
        self.value = Some(value);
        Ok(())
    }
}

/// Wire description of one parameter.
pub(crate) struct Setting<T> {
    /// Name used in logs and validation errors.
    pub name: &'static str,
    /// SCPI header; the query is the header followed by `?`.
    pub header: &'static str,
    /// Capability the parameter requires, if any.
    pub feature: Option<Feature>,
    pub decode: fn(&str) -> Option<T>,
    pub encode: fn(&T) -> String,
}

impl<T> Setting<T> {
    pub fn query(&self) -> String {
        format!("{}?", self.header)
    }

    pub fn command(&self, value: &T) -> String {
        let argument = (self.encode)(value);
        if argument.is_empty() {
            self.header.to_string()
        } else {
            format!("{} {}", self.header, argument)
        }
    }
}

pub(crate) fn decode_number(response: &str) -> Option<f64> {
    response.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn decode_switch(response: &str) -> Option<bool> {
    match response.trim().to_ascii_lowercase().as_str() {
        "1" | "on" => Some(true),
        "0" | "off" => Some(false),
        _ => None,
    }
}

/// The phase adjustment query reports radians.
pub(crate) fn decode_radians_as_degrees(response: &str) -> Option<f64> {
    decode_number(response).map(f64::to_degrees)
}

pub(crate) fn encode_switch(on: &bool) -> String {
    if *on { "1" } else { "0" }.to_string()
}

pub(crate) fn encode_hertz(value: &f64) -> String {
    format!("{}{}", value, Unit::Hertz.symbol())
}

pub(crate) fn encode_dbm(value: &f64) -> String {
    format!("{}{}", value, Unit::DecibelMilliwatt.symbol())
}

pub(crate) fn encode_degrees(value: &f64) -> String {
    format!("{}{}", value, Unit::Degree.symbol())
}

pub(crate) fn encode_nothing(_: &bool) -> String {
    String::new()
}

pub(crate) const FREQUENCY: Setting<f64> = Setting {
    name: "frequency",
    header: ":SOURce:FREQuency:CW",
    feature: None,
    decode: decode_number,
    encode: encode_hertz,
};

pub(crate) const POWER: Setting<f64> = Setting {
    name: "power",
    header: ":SOURce:POWer:LEVel:IMMediate:AMPlitude",
    feature: None,
    decode: decode_number,
    encode: encode_dbm,
};

pub(crate) const OUTPUT: Setting<bool> = Setting {
    name: "output",
    header: ":OUTPut:STATe",
    feature: None,
    decode: decode_switch,
    encode: encode_switch,
};

pub(crate) const MODULATION: Setting<bool> = Setting {
    name: "modulation",
    header: ":OUTPut:MODulation:STATe",
    feature: Some(Feature::Modulation),
    decode: decode_switch,
    encode: encode_switch,
};

pub(crate) const PHASE_CONTINUOUS: Setting<bool> = Setting {
    name: "phase_continuous",
    header: ":SOURce:FREQuency:CONTinuous:MODE",
    feature: Some(Feature::PhaseContinuous),
    decode: decode_switch,
    encode: encode_switch,
};

/// Write-only: zeroing takes no argument and has no query form.
pub(crate) const PHASE_REFERENCE: Setting<bool> = Setting {
    name: "phase_reference",
    header: ":SOURce:PHASe:REFerence",
    feature: None,
    decode: decode_switch,
    encode: encode_nothing,
};

pub(crate) const PHASE_ADJUSTMENT: Setting<f64> = Setting {
    name: "phase_adjustment",
    header: ":SOURce:PHASe:ADJust",
    feature: None,
    decode: decode_radians_as_degrees,
    encode: encode_degrees,
};

/// A transport plus the settle delay applied around every operation.
pub(crate) struct Link<T: Transport> {
    transport: T,
    settle_delay: Duration,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, settle_delay: Duration) -> Self {
        Self {
            transport,
            settle_delay,
        }
    }

    pub fn write(&mut self, command: &str) -> Result<(), TransportError> {
        debug!(command, "SCPI write");
        self.transport.write(command)
    }

    /// Write followed by the settle delay.
    pub fn write_settled(&mut self, command: &str) -> Result<(), TransportError> {
        self.write(command)?;
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        Ok(())
    }

    pub fn query(&mut self, command: &str) -> Result<String, TransportError> {
        let response = self.transport.query(command, self.settle_delay)?;
        let response = response.trim().to_string();
        debug!(command, %response, "SCPI query");
        Ok(response)
    }

    /// `*OPC?` acknowledgement check.
    ///
    /// Returns the raw response alongside the verdict.
    pub fn operation_complete(&mut self) -> Result<(bool, String), TransportError> {
        let response = self.query(OPC_QUERY)?;
        Ok((response == "1", response))
    }

    /// Fail with [`InstrumentError::WriteNotConfirmed`] unless `*OPC?` answers `1`.
    pub fn confirm(&mut self, command: &str) -> InstrumentResult<()> {
        match self.operation_complete()? {
            (true, _) => Ok(()),
            (false, response) => {
                warn!(%command, %response, "Instrument did not confirm command");
                Err(InstrumentError::WriteNotConfirmed {
                    command: command.to_string(),
                    response,
                })
            }
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn close(mut self) -> Result<(), TransportError> {
        self.transport.close()
    }
}
