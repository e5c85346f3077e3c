//! # Engine Configuration
//!
//! Every field has a default, so an empty document is a valid config.
//! Values come from YAML first and are then overridden by `SECMON_*`
//! environment variables:
//!
//! | Field | Variable | Default |
//! |---|---|---|
//! | `pool_size` | `SECMON_POOL_SIZE` | 4 |
//! | `tick_secs` | `SECMON_TICK_SECS` | 60 |
//! | `watcher_timeout_secs` | `SECMON_WATCHER_TIMEOUT_SECS` | 300 |
//! | `auditor_timeout_secs` | `SECMON_AUDITOR_TIMEOUT_SECS` | 120 |
//! | `store_timeout_secs` | `SECMON_STORE_TIMEOUT_SECS` | 30 |
//! | `exception_ttl_days` | `SECMON_EXCEPTION_TTL_DAYS` | 10 |
//! | `default_interval_minutes` | `SECMON_DEFAULT_INTERVAL_MINUTES` | 1440 |
//! | `attention_threshold` | `SECMON_ATTENTION_THRESHOLD` | 5 |

use std::str::FromStr;
use std::time::Duration;

use secmon_core::PollingInterval;
use serde::{Deserialize, Serialize};

/// Tunables for the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of pairs running at once across all cycles.
    pub pool_size: usize,
    /// Seconds between scheduler ticks.
    pub tick_secs: u64,
    /// Timeout for one watcher fetch.
    pub watcher_timeout_secs: u64,
    /// Timeout for one auditor evaluation.
    pub auditor_timeout_secs: u64,
    /// Timeout for one store call made during a pair run.
    pub store_timeout_secs: u64,
    /// How long exception-log entries are kept.
    pub exception_ttl_days: u32,
    /// Interval used for technologies with no stored config.
    pub default_interval_minutes: PollingInterval,
    /// Consecutive failures before a pair is flagged. `0` disables flagging.
    pub attention_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            tick_secs: 60,
            watcher_timeout_secs: 300,
            auditor_timeout_secs: 120,
            store_timeout_secs: 30,
            exception_ttl_days: 10,
            default_interval_minutes: PollingInterval::Daily,
            attention_threshold: 5,
        }
    }
}

impl EngineConfig {
    /// Parse from YAML and validate. Environment overrides are not applied.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `SECMON_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup, then validate.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        override_parsed(&lookup, "SECMON_POOL_SIZE", &mut self.pool_size)?;
        override_parsed(&lookup, "SECMON_TICK_SECS", &mut self.tick_secs)?;
        override_parsed(
            &lookup,
            "SECMON_WATCHER_TIMEOUT_SECS",
            &mut self.watcher_timeout_secs,
        )?;
        override_parsed(
            &lookup,
            "SECMON_AUDITOR_TIMEOUT_SECS",
            &mut self.auditor_timeout_secs,
        )?;
        override_parsed(&lookup, "SECMON_STORE_TIMEOUT_SECS", &mut self.store_timeout_secs)?;
        override_parsed(&lookup, "SECMON_EXCEPTION_TTL_DAYS", &mut self.exception_ttl_days)?;
        override_parsed(
            &lookup,
            "SECMON_ATTENTION_THRESHOLD",
            &mut self.attention_threshold,
        )?;

        if let Some(raw) = lookup("SECMON_DEFAULT_INTERVAL_MINUTES") {
            let minutes: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "SECMON_DEFAULT_INTERVAL_MINUTES".to_string(),
                value: raw.clone(),
            })?;
            self.default_interval_minutes =
                PollingInterval::from_minutes(minutes).map_err(|_| ConfigError::InvalidEnv {
                    var: "SECMON_DEFAULT_INTERVAL_MINUTES".to_string(),
                    value: raw,
                })?;
        }
        self.validate()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid(format!("{field} must be greater than zero")))
            } else {
                Ok(())
            }
        };
        zero("pool_size", self.pool_size as u64)?;
        zero("tick_secs", self.tick_secs)?;
        zero("watcher_timeout_secs", self.watcher_timeout_secs)?;
        zero("auditor_timeout_secs", self.auditor_timeout_secs)?;
        zero("store_timeout_secs", self.store_timeout_secs)?;
        zero("exception_ttl_days", u64::from(self.exception_ttl_days))?;
        Ok(())
    }

    /// Scheduler tick period.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Watcher fetch timeout.
    pub fn watcher_timeout(&self) -> Duration {
        Duration::from_secs(self.watcher_timeout_secs)
    }

    /// Auditor evaluation timeout.
    pub fn auditor_timeout(&self) -> Duration {
        Duration::from_secs(self.auditor_timeout_secs)
    }

    /// Store call timeout.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Exception-log retention.
    pub fn exception_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.exception_ttl_days))
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(var) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File path.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The YAML document is malformed or has unknown fields.
    #[error("invalid config document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
    },
    /// A setting is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
