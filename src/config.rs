//! Configuration loading using Figment
//!
//! Configuration is loaded from a TOML file and then overridden by environment
//! variables prefixed with `RFSIGGEN_`. Nested keys are separated by a double
//! underscore:
//!
//! ```text
//! RFSIGGEN_APPLICATION__LOG_LEVEL=debug
//! RFSIGGEN_INSTRUMENT__ADDRESS=19
//! RFSIGGEN_INSTRUMENT__SETTLE_DELAY_MS=100
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rf_siggen::config::SigGenConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SigGenConfig::load()?;
//!     println!("Instrument: {} at {}", config.instrument.name, config.instrument.address);
//!     Ok(())
//! }
//! ```

use crate::adapters::TransportOptions;
use crate::instrument::{address, InstrumentAddress, SessionOptions};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigGenConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// The signal generator to control
    pub instrument: InstrumentConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory for per-session log files; console only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Signal generator connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Alias used in log messages
    #[serde(default = "default_instrument_name")]
    pub name: String,
    /// IPv4 literal (string) or GPIB primary address (integer)
    pub address: InstrumentAddress,
    /// Delay between VISA operations in milliseconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// I/O timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Response line terminator
    #[serde(default = "default_termination")]
    pub read_termination: String,
    /// Command line terminator
    #[serde(default = "default_termination")]
    pub write_termination: String,
}

fn default_instrument_name() -> String {
    "SigGen".to_string()
}

fn default_settle_delay() -> u64 {
    250
}

fn default_timeout() -> u64 {
    5000
}

fn default_termination() -> String {
    "\n".to_string()
}

impl SigGenConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be loaded or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Default settings for the instrument at `address`, without any file.
    pub fn for_address(address: impl Into<InstrumentAddress>) -> Self {
        Self {
            application: ApplicationConfig {
                name: "rf_siggen".to_string(),
                log_level: "info".to_string(),
                log_dir: None,
            },
            instrument: InstrumentConfig {
                name: default_instrument_name(),
                address: address.into(),
                settle_delay_ms: default_settle_delay(),
                timeout_ms: default_timeout(),
                read_termination: default_termination(),
                write_termination: default_termination(),
            },
        }
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables (`RFSIGGEN_` prefix) take precedence over the
    /// file. The result is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be loaded or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RFSIGGEN_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Instrument address resolves to a VISA resource
    /// - Timeout is non-zero
    /// - Terminators are non-empty
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        self.instrument.validate()
    }
}

impl InstrumentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Instrument 'name' cannot be empty".to_string(),
            ));
        }

        address::resolve(&self.address).map_err(|err| {
            ConfigError::ValidationError(format!(
                "Instrument '{}': {}",
                self.name, err
            ))
        })?;

        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': 'timeout_ms' must be > 0",
                self.name
            )));
        }

        if self.read_termination.is_empty() || self.write_termination.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': terminators cannot be empty",
                self.name
            )));
        }

        Ok(())
    }

    /// Transport settings derived from this configuration.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            read_termination: self.read_termination.clone(),
            write_termination: self.write_termination.clone(),
        }
    }

    /// Session settings derived from this configuration, logging to `log_sink`.
    pub fn session_options(&self, log_sink: Option<tracing::Dispatch>) -> SessionOptions {
        SessionOptions {
            name: self.name.clone(),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            transport: self.transport_options(),
            log_sink,
        }
    }
}
