//! Application configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`AppConfig::default`])
//! 2. `config/bode.toml` (or any file passed to [`AppConfig::load_from`])
//! 3. Environment variables prefixed with `BODE_DAQ_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use bode_daq::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Backend: {}", config.backend.base_url);
//! # Ok(())
//! # }
//! ```
//!
//! Override the backend from the shell:
//! `BODE_DAQ_BACKEND__BASE_URL=http://bench-pc:8000 bode-daq status`

use crate::error::{BodeError, BodeResult};
use crate::sweep_config::SweepConfig;
use crate::validation::parse_base_url;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition backend connection
    pub backend: BackendConfig,
    /// Initial values of the live sweep configuration
    pub sweep: SweepConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Bode DAQ".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Acquisition backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend REST API
    pub base_url: String,
    /// Seconds between instrument status polls
    #[serde(default = "default_poll_interval")]
    pub status_poll_interval_secs: u64,
    /// Timeout for status and configuration requests in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            status_poll_interval_secs: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Status poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Default value functions
fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    5000
}

impl AppConfig {
    /// Default configuration file location.
    pub const DEFAULT_PATH: &'static str = "config/bode.toml";

    /// Load configuration from `config/bode.toml` and environment variables.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> BodeResult<Self> {
        Self::load_from(Self::DEFAULT_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> BodeResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BODE_DAQ_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BodeResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(BodeError::ConfigValidation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        parse_base_url(&self.backend.base_url).map_err(|reason| {
            BodeError::ConfigValidation(format!(
                "Invalid backend base_url '{}': {reason}",
                self.backend.base_url
            ))
        })?;

        if self.backend.status_poll_interval_secs == 0 {
            return Err(BodeError::ConfigValidation(
                "status_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(BodeError::ConfigValidation(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        self.sweep.validate().map_err(|err| {
            BodeError::ConfigValidation(format!("Invalid default sweep: {err}"))
        })
    }
}
