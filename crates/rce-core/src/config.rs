//! Control plane configuration
//!
//! Loaded from TOML, then overridden from `RCE_<SECTION>_<KEY>` environment
//! variables, then validated. Every field has a default so an empty file is a
//! valid configuration.

use crate::errors::{RceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "RCE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RceConfig {
    pub balancer: BalancerConfig,
    pub messenger: MessengerConfig,
    pub logging: LoggingConfig,
}

/// Placement scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Pending reservations older than this are released by the sweeper
    pub reservation_timeout_ms: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            reservation_timeout_ms: 60_000,
        }
    }
}

impl BalancerConfig {
    pub fn reservation_timeout(&self) -> Duration {
        Duration::from_millis(self.reservation_timeout_ms)
    }
}

/// Message router settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// Window in which a response is matched to its request
    pub correlation_timeout_ms: u64,
    /// Upper bound on outstanding correlations; oldest are evicted first
    pub max_pending_correlations: usize,
    /// Period of the background expiry sweep
    pub reaper_interval_ms: u64,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            correlation_timeout_ms: 30_000,
            max_pending_correlations: 10_000,
            reaper_interval_ms: 5_000,
        }
    }
}

impl MessengerConfig {
    pub fn correlation_timeout(&self) -> Duration {
        Duration::from_millis(self.correlation_timeout_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info,rce_messaging=debug`
    pub filter: String,
    /// Emit ANSI colour codes
    pub ansi: bool,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: false,
            with_target: true,
        }
    }
}

impl RceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RceError::invalid_config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `RCE_<SECTION>_<KEY>` overrides from an arbitrary source
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.set_from_string(&name.to_lowercase(), &value)?;
        }
        Ok(())
    }

    /// Set one value addressed as `section_key`
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "balancer_reservation_timeout_ms" => {
                self.balancer.reservation_timeout_ms = parse_value(key, value)?;
            }
            "messenger_correlation_timeout_ms" => {
                self.messenger.correlation_timeout_ms = parse_value(key, value)?;
            }
            "messenger_max_pending_correlations" => {
                self.messenger.max_pending_correlations = parse_value(key, value)?;
            }
            "messenger_reaper_interval_ms" => {
                self.messenger.reaper_interval_ms = parse_value(key, value)?;
            }
            "logging_filter" => self.logging.filter = value.to_string(),
            "logging_ansi" => self.logging.ansi = parse_value(key, value)?,
            "logging_with_target" => self.logging.with_target = parse_value(key, value)?,
            _ => tracing::debug!(key, "ignoring unknown configuration override"),
        }
        Ok(())
    }

    /// Reject settings that would disable expiry or bounding
    pub fn validate(&self) -> Result<()> {
        if self.balancer.reservation_timeout_ms == 0 {
            return Err(RceError::invalid_config(
                "balancer.reservation_timeout_ms must be positive",
            ));
        }
        if self.messenger.correlation_timeout_ms == 0 {
            return Err(RceError::invalid_config(
                "messenger.correlation_timeout_ms must be positive",
            ));
        }
        if self.messenger.max_pending_correlations == 0 {
            return Err(RceError::invalid_config(
                "messenger.max_pending_correlations must be positive",
            ));
        }
        if self.messenger.reaper_interval_ms == 0 {
            return Err(RceError::invalid_config(
                "messenger.reaper_interval_ms must be positive",
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(RceError::invalid_config("logging.filter must not be empty"));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RceError::invalid_config(format!("{key}: cannot parse '{value}': {e}")))
}
