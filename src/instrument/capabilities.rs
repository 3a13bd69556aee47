//! Option-dependent features of the signal generator.
//!
//! Some controls only exist when an option is licensed on the specific unit.
//! [`CapabilityGate`] answers that from the records captured during the
//! handshake. It holds no state of its own and is rebuilt for every check, so an
//! answer can never outlive the data it was computed from.

use super::identity::{InstrumentIdentity, OptionRecord};
use crate::error::{InstrumentError, InstrumentResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model with built-in modulation and an attenuator switch counter.
pub const HIGH_END_MODEL: &str = "E8267D";

/// Option marker enabling modulation control on the other models.
pub const MODULATION_OPTION: &str = "UNT";

/// Option markers enabling phase-continuous fine sweep.
pub const PHASE_CONTINUOUS_OPTIONS: [&str; 4] = ["U01", "U02", "U04", "U06"];

/// A feature that may or may not be present on a given unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Analog/vector modulation on/off control.
    Modulation,
    /// Phase-continuous fine sweep mode.
    PhaseContinuous,
    /// Attenuator switch cycle counter diagnostic.
    AttenuatorCounter,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Modulation => "modulation",
            Feature::PhaseContinuous => "phase-continuous fine sweep",
            Feature::AttenuatorCounter => "attenuator switch counter",
        })
    }
}

/// Answers feature availability from the identity and option records.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityGate<'a> {
    model_number: &'a str,
    options: &'a [OptionRecord],
}

impl<'a> CapabilityGate<'a> {
    /// Build a gate over handshake data.
    pub fn new(identity: &'a InstrumentIdentity, options: &'a [OptionRecord]) -> Self {
        Self {
            model_number: &identity.model_number,
            options,
        }
    }

    fn has_option(&self, marker: &str) -> bool {
        self.options.iter().any(|option| option.name.contains(marker))
    }

    /// Whether `feature` is present on this unit.
    pub fn is_available(&self, feature: Feature) -> bool {
        match feature {
            Feature::Modulation => {
                self.has_option(MODULATION_OPTION) || self.model_number == HIGH_END_MODEL
            }
            Feature::PhaseContinuous => PHASE_CONTINUOUS_OPTIONS
                .iter()
                .any(|marker| self.has_option(marker)),
            Feature::AttenuatorCounter => self.model_number == HIGH_END_MODEL,
        }
    }

    /// Fail with [`InstrumentError::FeatureNotLicensed`] if `feature` is absent.
    pub fn require(&self, feature: Feature) -> InstrumentResult<()> {
        if self.is_available(feature) {
            Ok(())
        } else {
            Err(InstrumentError::FeatureNotLicensed(feature))
        }
    }
}
