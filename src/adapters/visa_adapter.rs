//! VISA Hardware Adapter for GPIB/Ethernet instruments
//!
//! Provides a [`Transport`] over the `visa-rs` crate, supporting resource strings
//! like:
//! - "GPIB0::19::INSTR" (GPIB interface)
//! - "TCPIP0::192.168.1.100::inst0::INSTR" (Ethernet/LXI)
//!
//! The VISA library is only linked with the `instrument_visa` feature. Without
//! it, [`VisaManager::open_resource`] fails with [`TransportError::NotEnabled`].

use super::{ResourceManager, Transport, TransportOptions};
use crate::error::TransportError;
use crate::instrument::ResourceId;
use std::io::{self, BufRead};
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{BufReader, Write};
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// Read one response ending in `terminator` and return it without the
/// terminator or trailing whitespace. An empty terminator falls back to `\n`.
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
fn read_terminated<R: BufRead>(reader: &mut R, terminator: &str) -> io::Result<String> {
    let terminator = if terminator.is_empty() { "\n" } else { terminator };
    let bytes = terminator.as_bytes();
    let last = bytes.last().copied().unwrap_or(b'\n');

    let mut buf = Vec::new();
    loop {
        if reader.read_until(last, &mut buf)? == 0 || buf.ends_with(bytes) {
            break;
        }
    }
    if buf.ends_with(bytes) {
        buf.truncate(buf.len() - bytes.len());
    }
    Ok(String::from_utf8_lossy(&buf).trim_end().to_string())
}

/// Opens [`VisaTransport`]s through the default VISA resource manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisaManager;

impl VisaManager {
    /// Create a manager. The VISA library is loaded lazily on first open.
    pub fn new() -> Self {
        Self
    }
}

/// One open VISA session.
pub struct VisaTransport {
    resource: String,
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    write_termination: String,
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    read_termination: String,
    #[cfg(feature = "instrument_visa")]
    instrument: Option<Instrument>,
    // Keeps the resource manager alive for as long as the instrument session.
    #[cfg(feature = "instrument_visa")]
    _rm: DefaultRM,
}

#[cfg(feature = "instrument_visa")]
fn visa_err(err: impl std::fmt::Display) -> TransportError {
    TransportError::Visa(err.to_string())
}

impl ResourceManager for VisaManager {
    type Transport = VisaTransport;

    #[cfg(feature = "instrument_visa")]
    fn open_resource(
        &self,
        resource: &ResourceId,
        options: &TransportOptions,
    ) -> Result<VisaTransport, TransportError> {
        let rm = DefaultRM::new().map_err(visa_err)?;
        let name = CString::new(resource.as_str()).map_err(visa_err)?;
        let instrument = rm
            .open(&name.into(), AccessMode::NO_LOCK, options.timeout)
            .map_err(visa_err)?;

        debug!(
            resource = resource.as_str(),
            timeout_ms = options.timeout.as_millis() as u64,
            "VISA resource opened"
        );

        Ok(VisaTransport {
            resource: resource.to_string(),
            write_termination: options.write_termination.clone(),
            read_termination: options.read_termination.clone(),
            instrument: Some(instrument),
            _rm: rm,
        })
    }

    #[cfg(not(feature = "instrument_visa"))]
    fn open_resource(
        &self,
        _resource: &ResourceId,
        _options: &TransportOptions,
    ) -> Result<VisaTransport, TransportError> {
        Err(TransportError::NotEnabled("instrument_visa".to_string()))
    }
}

impl VisaTransport {
    /// VISA resource string this transport was opened on.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[cfg(feature = "instrument_visa")]
    fn instrument(&self) -> Result<&Instrument, TransportError> {
        self.instrument.as_ref().ok_or(TransportError::Closed)
    }
}

#[cfg(feature = "instrument_visa")]
impl Transport for VisaTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", command, self.write_termination);
        let mut instrument = self.instrument()?;
        instrument.write_all(line.as_bytes())?;
        debug!(resource = %self.resource, command, "VISA write sent");
        Ok(())
    }

    fn query(&mut self, command: &str, delay: Duration) -> Result<String, TransportError> {
        self.write(command)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut reader = BufReader::new(self.instrument()?);
        let response = read_terminated(&mut reader, &self.read_termination)?;

        debug!(resource = %self.resource, command, %response, "VISA query");
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the instrument closes the VISA session.
        match self.instrument.take() {
            Some(_) => {
                debug!(resource = %self.resource, "VISA resource closed");
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

#[cfg(not(feature = "instrument_visa"))]
impl Transport for VisaTransport {
    fn write(&mut self, _command: &str) -> Result<(), TransportError> {
        Err(TransportError::NotEnabled("instrument_visa".to_string()))
    }

    fn query(&mut self, _command: &str, _delay: Duration) -> Result<String, TransportError> {
        Err(TransportError::NotEnabled("instrument_visa".to_string()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_stops_at_configured_terminator() {
        let mut reader = Cursor::new(b"1\r2\r".to_vec());
        assert_eq!(read_terminated(&mut reader, "\r").expect("read"), "1");
        assert_eq!(read_terminated(&mut reader, "\r").expect("read"), "2");
    }

    #[test]
    fn test_read_multi_byte_terminator() {
        let mut reader = Cursor::new(b"+2.4E9\r\n*".to_vec());
        assert_eq!(read_terminated(&mut reader, "\r\n").expect("read"), "+2.4E9");

        let mut reader = Cursor::new(b"A\nB\r\n".to_vec());
        assert_eq!(
            read_terminated(&mut reader, "\r\n").expect("read"),
            "A\nB",
            "a bare newline is part of the response"
        );
    }

    #[test]
    fn test_read_default_and_unterminated() {
        let mut reader = Cursor::new(b"Agilent,E4438C\n".to_vec());
        assert_eq!(read_terminated(&mut reader, "").expect("read"), "Agilent,E4438C");

        let mut reader = Cursor::new(b"partial ".to_vec());
        assert_eq!(read_terminated(&mut reader, "\n").expect("read"), "partial");
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_open_without_feature_reports_flag() {
        let err = VisaManager::new()
            .open_resource(
                &ResourceId::from_raw("GPIB0::19::INSTR"),
                &TransportOptions::default(),
            )
            .err()
            .expect("open must fail without the VISA feature");
        assert!(err.to_string().contains("--features instrument_visa"));
    }
}
