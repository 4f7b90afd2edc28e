use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::key_generator::KeyStrategy;

/// Command-line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "timebank-monitor", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional JSON file with monitor settings
    #[arg(long = "settings", env = "MONITOR_SETTINGS")]
    pub settings_path: Option<PathBuf>,

    /// Overrides the per-client request limit from the settings file
    #[arg(long, env = "REQUESTS_PER_MINUTE")]
    pub requests_per_minute: Option<u32>,

    /// How clients are identified for rate limiting
    #[arg(long, env = "KEY_STRATEGY", value_enum, default_value = "ip")]
    pub key_strategy: KeyStrategy,
}

impl Config {
    /// Build the effective monitor settings: the settings file (or defaults),
    /// then command-line overrides, then validation.
    pub fn settings(&self) -> Result<MonitorSettings> {
        let mut settings = match &self.settings_path {
            Some(path) => MonitorSettings::from_json(&fs::read_to_string(path)?)?,
            None => MonitorSettings::default(),
        };

        if let Some(requests_per_minute) = self.requests_per_minute {
            settings.limiter.requests_per_minute = requests_per_minute;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorSettings {
    #[validate(nested)]
    pub limiter: LimiterSettings,
    #[validate(nested)]
    pub cache: CacheSettings,
    #[validate(nested)]
    pub monitoring: MonitoringSettings,
}

impl MonitorSettings {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LimiterSettings {
    #[validate(range(min = 1))]
    pub requests_per_minute: u32,
    /// How often idle client budgets are swept
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "non_zero_duration"))]
    pub sweep_interval: Duration,
    /// Idle time after which a client budget is dropped
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "non_zero_duration"))]
    pub retention: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            sweep_interval: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "non_zero_duration"))]
    pub default_ttl: Duration,
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "non_zero_duration"))]
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitoringSettings {
    #[validate(range(min = 1))]
    pub history_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,
    /// Error rate above which `/health` reports unhealthy
    #[validate(range(min = 0.0))]
    pub max_errors_per_minute: f64,
    /// How many recent errors and alerts `/metrics` returns
    #[validate(range(min = 1))]
    pub recent_limit: usize,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            slow_request_threshold: Duration::from_secs(1),
            max_errors_per_minute: 5.0,
            recent_limit: 10,
        }
    }
}

fn non_zero_duration(value: &Duration) -> std::result::Result<(), ValidationError> {
    if value.is_zero() {
        return Err(ValidationError::new("non_zero_duration"));
    }
    Ok(())
}
