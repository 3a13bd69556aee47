//! Self-description records captured during the identify handshake.
//!
//! The generator describes itself through three responses:
//!
//! - `*IDN?` → `vendor,model,serial,firmware`
//! - `:DIAGnostic:INFOrmation:BOARds?` → `"name,part,serial,version,status","..."`
//! - `:DIAGnostic:INFOrmation:OPTions:DETail?` → `"name,revision,dsp","..."`
//!
//! Records are the text between each pair of double quotes, split on commas.
//! All records are immutable once parsed.

use crate::error::{InstrumentError, InstrumentResult};
use serde::Serialize;

/// Vendor, model, serial number and firmware version as reported by `*IDN?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentIdentity {
    /// Manufacturer, e.g. "Agilent Technologies".
    pub vendor: String,
    /// Model number, e.g. "E4438C".
    pub model_number: String,
    /// Serial number.
    pub serial_number: String,
    /// Firmware version.
    pub firmware_version: String,
}

impl InstrumentIdentity {
    /// Parse an `*IDN?` response into exactly four trimmed fields.
    pub fn parse(response: &str) -> InstrumentResult<Self> {
        match split_fields::<4>(response) {
            Some([vendor, model_number, serial_number, firmware_version]) => Ok(Self {
                vendor,
                model_number,
                serial_number,
                firmware_version,
            }),
            None => Err(InstrumentError::MalformedIdentity(response.to_string())),
        }
    }
}

/// One hardware board installed in the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRecord {
    /// Board name.
    pub name: String,
    /// Part number.
    pub part_number: String,
    /// Serial number.
    pub serial_number: String,
    /// Board version number.
    pub version_number: String,
    /// Self-test status.
    pub status: String,
}

impl BoardRecord {
    /// Parse every quoted board record in a `BOARds?` response.
    pub fn parse_all(response: &str) -> InstrumentResult<Vec<Self>> {
        quoted_records(response)
            .map(|record| match split_fields::<5>(record) {
                Some([name, part_number, serial_number, version_number, status]) => Ok(Self {
                    name,
                    part_number,
                    serial_number,
                    version_number,
                    status,
                }),
                None => Err(InstrumentError::MalformedBoardRecord(record.to_string())),
            })
            .collect()
    }
}

/// One licensed option installed in the instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionRecord {
    /// Option designator, e.g. "UNT" or "U01".
    pub name: String,
    /// Option revision.
    pub revision: String,
    /// DSP version.
    pub dsp_version: String,
}

impl OptionRecord {
    /// Parse every quoted option record in an `OPTions:DETail?` response.
    pub fn parse_all(response: &str) -> InstrumentResult<Vec<Self>> {
        quoted_records(response)
            .map(|record| match split_fields::<3>(record) {
                Some([name, revision, dsp_version]) => Ok(Self {
                    name,
                    revision,
                    dsp_version,
                }),
                None => Err(InstrumentError::MalformedOptionRecord(record.to_string())),
            })
            .collect()
    }
}

/// Usage counters logged at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounters {
    /// Firmware build date and time stamp.
    pub firmware_date: String,
    /// Cumulative power-on hours.
    pub power_on_hours: String,
    /// Attenuator switch count, on models that keep one.
    pub attenuator_switches: Option<String>,
    /// Number of times the instrument has been turned on.
    pub power_on_cycles: String,
}

/// Text between each pair of double quotes.
fn quoted_records(response: &str) -> impl Iterator<Item = &str> {
    response.split('"').skip(1).step_by(2)
}

fn split_fields<const N: usize>(record: &str) -> Option<[String; N]> {
    let fields: Vec<String> = record.split(',').map(|f| f.trim().to_string()).collect();
    fields.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fields_are_trimmed() {
        let identity =
            InstrumentIdentity::parse("Agilent Technologies, E4438C, MY45091234, C.05.83")
                .expect("valid identity");
        assert_eq!(identity.vendor, "Agilent Technologies");
        assert_eq!(identity.model_number, "E4438C");
        assert_eq!(identity.serial_number, "MY45091234");
        assert_eq!(identity.firmware_version, "C.05.83");
    }

    #[test]
    fn test_identity_requires_four_fields() {
        for response in ["Agilent,E4438C,MY1", "a,b,c,d,e", ""] {
            let err = InstrumentIdentity::parse(response).unwrap_err();
            assert!(
                matches!(err, InstrumentError::MalformedIdentity(_)),
                "'{response}' should be rejected"
            );
        }
    }

    #[test]
    fn test_board_records() {
        let boards = BoardRecord::parse_all(
            "\"CPU,E4400-60538,MY45000101,A.01,OK\",\"Synthesizer,E4400-60537,MY45000102,B.03,OK\"",
        )
        .expect("valid boards");
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[1].name, "Synthesizer");
        assert_eq!(boards[1].version_number, "B.03");
        assert_eq!(boards[0].status, "OK");
    }

    #[test]
    fn test_malformed_board_record() {
        let err = BoardRecord::parse_all("\"CPU,E4400-60538,OK\"").unwrap_err();
        assert!(matches!(err, InstrumentError::MalformedBoardRecord(ref r) if r == "CPU,E4400-60538,OK"));
    }

    #[test]
    fn test_option_records() {
        let options =
            OptionRecord::parse_all("\"1E5,A.01,N/A\",\"UNT,A.02,3.1\"").expect("valid options");
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].name, "UNT");
        assert_eq!(options[1].dsp_version, "3.1");
    }

    #[test]
    fn test_empty_response_has_no_records() {
        assert!(OptionRecord::parse_all("").expect("empty").is_empty());
        assert!(BoardRecord::parse_all("\"\"").is_err());
    }

    #[test]
    fn test_malformed_option_record() {
        let err = OptionRecord::parse_all("\"UNT,A.02\"").unwrap_err();
        assert!(matches!(err, InstrumentError::MalformedOptionRecord(_)));
    }
}
