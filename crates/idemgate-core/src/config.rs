//! Gateway configuration.
//!
//! Loaded from a TOML file with every field optional; command-line flags
//! in the server binary override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value is out of its allowed domain.
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Configuration for the idempotency gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Default retention window in hours for records whose merchant has no
    /// policy. Must be at least 1.
    pub retention_ttl_hours: u32,
    /// Duplicate-rate percentage above which the monitor reports an
    /// anomaly (strictly greater).
    pub anomaly_threshold_percent: f64,
    /// Attempt count above which the reporter flags a key as suspicious.
    pub suspicious_attempt_threshold: u32,
    /// Sliding-window length for the anomaly monitor, in minutes.
    pub window_minutes: u32,
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// How often the retention sweeper runs, in seconds.
    pub sweep_interval_secs: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retention_ttl_hours: 24,
            anomaly_threshold_percent: 20.0,
            suspicious_attempt_threshold: 3,
            window_minutes: 5,
            database_path: PathBuf::from("idemgate.db"),
            listen_addr: "127.0.0.1:8080".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from a TOML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field's domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_ttl_hours < 1 {
            return Err(ConfigError::InvalidValue {
                field: "retention_ttl_hours",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.window_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                field: "window_minutes",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.anomaly_threshold_percent.is_finite() || self.anomaly_threshold_percent < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "anomaly_threshold_percent",
                reason: format!("must be a non-negative number, got {}", self.anomaly_threshold_percent),
            });
        }
        if self.sweep_interval_secs < 1 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The default retention window as a time delta.
    #[must_use]
    pub fn retention_ttl(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.retention_ttl_hours))
    }

    /// The monitor window as a time delta.
    #[must_use]
    pub fn window(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.window_minutes))
    }

    /// The sweep interval as a std duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sweep_interval_secs))
    }
}
