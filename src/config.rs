//! Application configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `FTMW_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use ftmw_daq::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/ftmw.toml")?;
//! config.validate()?;
//! println!("Sample: {}", config.run.sample);
//! # Ok::<(), ftmw_daq::error::AcqError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AcqError, AcqResult};
use crate::experiment::controller::AcquisitionSettings;
use crate::experiment::run_config::RunConfiguration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition timing and output location
    pub acquisition: AcquisitionConfig,
    /// Run parameters used when a run is started from the command line
    pub run: RunConfiguration,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "ftmw-daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Acquisition timing and storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Trace-count poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Nozzle temperature poll interval in milliseconds
    pub temperature_poll_interval_ms: u64,
    /// Setpoint written when a temperature ramp resets the nozzle, °C
    pub nozzle_reset_c: f64,
    /// Directory receiving trace and spectrum files
    pub data_dir: PathBuf,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            temperature_poll_interval_ms: 1000,
            nozzle_reset_c: 20.0,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl AcquisitionConfig {
    /// Controller settings derived from this section.
    pub fn settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            temperature_poll_interval: Duration::from_millis(self.temperature_poll_interval_ms),
            nozzle_reset_c: self.nozzle_reset_c,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific file path
    ///
    /// Environment variables override the file, e.g.
    /// `FTMW_DAQ_ACQUISITION__POLL_INTERVAL_MS=200`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AcqResult<Self> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FTMW_DAQ_").split("__"))
            .extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AcqResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(AcqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_LOG_FORMATS.contains(&format.as_str()) {
            return Err(AcqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_LOG_FORMATS.join(", ")
            )));
        }

        if self.acquisition.poll_interval_ms == 0 {
            return Err(AcqError::Configuration(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.acquisition.temperature_poll_interval_ms == 0 {
            return Err(AcqError::Configuration(
                "temperature_poll_interval_ms must be positive".to_string(),
            ));
        }

        self.run.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::run_config::{Band, RunMode};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.poll_interval_ms, 500);
        assert_eq!(
            config.acquisition.settings().poll_interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn loads_partial_file_over_defaults() {
        let file = write_config(
            r#"
            [application]
            log_level = "debug"

            [acquisition]
            data_dir = "/tmp/ftmw"

            [run]
            band = "6-18"
            sample = "furan"
            save_threshold = 5000

            [run.mode]
            kind = "temperature_sequence"
            steps = [40.0, 50.0, 60.0]
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, "pretty");
        assert_eq!(config.acquisition.data_dir, PathBuf::from("/tmp/ftmw"));
        assert_eq!(config.acquisition.temperature_poll_interval_ms, 1000);
        assert_eq!(config.run.band, Band::High);
        assert_eq!(config.run.sample, "furan");
        assert_eq!(
            config.run.mode,
            RunMode::TemperatureSequence {
                steps: vec![40.0, 50.0, 60.0]
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let file = write_config("[acquisition]\npoll_interval_ms = \"fast\"\n");
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(AcqError::Config(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.application.log_level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.application.log_format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.acquisition.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.run.mode = RunMode::TemperatureSequence {
            steps: vec![60.0, 50.0],
        };
        assert!(matches!(
            config.validate(),
            Err(AcqError::Configuration(_))
        ));
    }
}
