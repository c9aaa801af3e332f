//! Tracker-scoped configuration (spec.md §6), loadable from environment
//! variables layered over a JSON file the way the teacher's `Config::load`
//! resolves server settings — env vars win, the file supplies the rest,
//! hardcoded defaults fill in anything left over.

use crate::types::PaymentRate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// `leeway / charge_period`, rounded, bounds how many consecutive unpaid
/// invoices are tolerated before the session gives up.
const CHARGE_PERIOD_LEEWAY: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid environment variable {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    #[serde(with = "humantime_secs", default = "defaults::charge_period")]
    pub charge_period: Duration,
    #[serde(
        with = "humantime_secs",
        default = "defaults::exchange_message_wait_timeout"
    )]
    pub exchange_message_wait_timeout: Duration,
    #[serde(default = "defaults::max_accountant_failure_count")]
    pub max_accountant_failure_count: u64,
    #[serde(default = "defaults::max_allowed_accountant_fee")]
    pub max_allowed_accountant_fee: u16,
    /// Reserved for future R-recovery (spec.md §9) — currently unused.
    #[serde(default)]
    pub max_r_recovery_length: u64,
    #[serde(default = "defaults::registry")]
    pub registry: String,
}

mod defaults {
    use std::time::Duration;

    pub fn charge_period() -> Duration {
        Duration::from_secs(60)
    }

    pub fn exchange_message_wait_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn max_accountant_failure_count() -> u64 {
        3
    }

    pub fn max_allowed_accountant_fee() -> u16 {
        1000
    }

    pub fn registry() -> String {
        String::new()
    }
}

mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            charge_period: defaults::charge_period(),
            exchange_message_wait_timeout: defaults::exchange_message_wait_timeout(),
            max_accountant_failure_count: defaults::max_accountant_failure_count(),
            max_allowed_accountant_fee: defaults::max_allowed_accountant_fee(),
            max_r_recovery_length: 0,
            registry: defaults::registry(),
        }
    }
}

impl TrackerConfig {
    /// `round(leeway / charge_period)`. With the default 2-hour leeway and a
    /// 1-hour charge period, this is `2`.
    pub fn max_not_received(&self) -> u64 {
        let ratio = CHARGE_PERIOD_LEEWAY.as_secs_f64() / self.charge_period.as_secs_f64();
        ratio.round() as u64
    }

    /// Loads a config file, then overlays `INVOICE_TRACKER_*` environment
    /// variables on top of it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: TrackerConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("INVOICE_TRACKER_CHARGE_PERIOD_SECS") {
            self.charge_period = Duration::from_secs(value.parse().map_err(|_| {
                ConfigError::InvalidEnv {
                    name: "INVOICE_TRACKER_CHARGE_PERIOD_SECS",
                    value: value.clone(),
                }
            })?);
        }
        if let Ok(value) = std::env::var("INVOICE_TRACKER_MAX_ACCOUNTANT_FAILURE_COUNT") {
            self.max_accountant_failure_count = value.parse().map_err(|_| {
                ConfigError::InvalidEnv {
                    name: "INVOICE_TRACKER_MAX_ACCOUNTANT_FAILURE_COUNT",
                    value: value.clone(),
                }
            })?;
        }
        Ok(())
    }
}

/// The per-session rate the caller supplies when constructing a tracker —
/// not deployment config, since it varies per agreement.
#[derive(Debug, Clone, Copy)]
pub struct SessionRate(pub PaymentRate);
