//! Loading a [`BackoffConfig`] from serde formats and the environment.
//!
//! Durations are carried as integer microseconds (`*_us` fields). Missing
//! fields take the [`BackoffConfig::default`] values, and every source runs
//! the same validation as [`BackoffConfigBuilder::build`](super::BackoffConfigBuilder::build).

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use super::BackoffConfig;
use crate::error::ConfigError;

/// Wire representation of [`BackoffConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RawBackoffConfig {
    max_attempts: u32,
    base: f64,
    scaling_us: u64,
    y_offset_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    per_attempt_cap_us: Option<u64>,
}

impl Default for RawBackoffConfig {
    fn default() -> Self {
        BackoffConfig::default().into()
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl From<BackoffConfig> for RawBackoffConfig {
    fn from(cfg: BackoffConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts(),
            base: cfg.base(),
            scaling_us: micros(cfg.scaling()),
            y_offset_us: micros(cfg.y_offset()),
            per_attempt_cap_us: cfg.per_attempt_cap().map(micros),
        }
    }
}

impl TryFrom<RawBackoffConfig> for BackoffConfig {
    type Error = ConfigError;

    fn try_from(raw: RawBackoffConfig) -> Result<Self, Self::Error> {
        let mut builder = BackoffConfig::builder()
            .max_attempts(raw.max_attempts)
            .base(raw.base)
            .scaling(Duration::from_micros(raw.scaling_us))
            .y_offset(Duration::from_micros(raw.y_offset_us));
        if let Some(cap) = raw.per_attempt_cap_us {
            builder = builder.per_attempt_cap(Duration::from_micros(cap));
        }
        builder.build()
    }
}

impl BackoffConfig {
    /// Load configuration from environment variables.
    ///
    /// With `prefix = "APP_RETRY"` this will look for:
    /// - `APP_RETRY_MAX_ATTEMPTS` for the attempt budget
    /// - `APP_RETRY_BASE` for the exponent base
    /// - `APP_RETRY_SCALING_US` for the scaling (microseconds)
    /// - `APP_RETRY_Y_OFFSET_US` for the offset (microseconds)
    /// - `APP_RETRY_PER_ATTEMPT_CAP_US` for the cap (microseconds, 0 = uncapped)
    ///
    /// Unset variables keep the defaults; a value that does not parse is an error.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let mut raw = RawBackoffConfig::default();

        if let Some(max_attempts) = env_var(prefix, "MAX_ATTEMPTS")? {
            raw.max_attempts = max_attempts;
        }
        if let Some(base) = env_var(prefix, "BASE")? {
            raw.base = base;
        }
        if let Some(scaling_us) = env_var(prefix, "SCALING_US")? {
            raw.scaling_us = scaling_us;
        }
        if let Some(y_offset_us) = env_var(prefix, "Y_OFFSET_US")? {
            raw.y_offset_us = y_offset_us;
        }
        if let Some(cap_us) = env_var(prefix, "PER_ATTEMPT_CAP_US")? {
            raw.per_attempt_cap_us = Some(cap_us);
        }

        raw.try_into()
    }
}

fn env_var<T: FromStr>(prefix: &str, name: &str) -> Result<Option<T>, ConfigError> {
    let var = format!("{prefix}_{name}");
    match env::var(&var) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::InvalidEnv { var, value }),
        },
        Err(_) => Ok(None),
    }
}
