use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

const MAX_CONCURRENCY_LIMIT: usize = 1024;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be between 1 and 1024")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid default_timeout_ms: cannot be 0")]
    ZeroTimeout,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid max_strategies: cannot be 0")]
    ZeroMaxStrategies,

    #[error("Invalid {0}: {1}. Must be in (0, 1]")]
    OutOfUnitRange(&'static str, f64),

    #[error("Invalid anomaly_window: {0}. Must be at least 2")]
    InvalidAnomalyWindow(usize),

    #[error("Invalid anomaly_z_score: {0}. Must be positive")]
    InvalidZScore(f64),

    #[error("Invalid threshold for '{0}': {1}. Must be positive")]
    InvalidThreshold(String, f64),

    #[error("Invalid max_records_per_metric: cannot be 0")]
    ZeroRecordCap,

    #[error("Invalid {0}: cannot be 0")]
    ZeroInterval(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .conductor/config.yaml (project config)
    /// 3. .conductor/local.yaml (local overrides, optional)
    /// 4. Environment variables (CONDUCTOR_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".conductor/config.yaml"))
            .merge(Yaml::file(".conductor/local.yaml"))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file over the defaults
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let dispatcher = &config.dispatcher;
        if dispatcher.max_concurrency == 0 || dispatcher.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(ConfigError::InvalidMaxConcurrency(dispatcher.max_concurrency));
        }
        if dispatcher.default_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.planner.max_strategies == 0 {
            return Err(ConfigError::ZeroMaxStrategies);
        }
        check_unit("planner.learning_rate", config.planner.learning_rate)?;
        check_unit("fallback.cooldown_penalty", config.fallback.cooldown_penalty)?;

        let escalation = &config.escalation;
        check_unit("escalation.learning_rate", escalation.learning_rate)?;
        if escalation.anomaly_window < 2 {
            return Err(ConfigError::InvalidAnomalyWindow(escalation.anomaly_window));
        }
        if !(escalation.anomaly_z_score > 0.0) {
            return Err(ConfigError::InvalidZScore(escalation.anomaly_z_score));
        }
        for (metric, threshold) in &escalation.thresholds {
            if !(*threshold > 0.0) {
                return Err(ConfigError::InvalidThreshold(metric.clone(), *threshold));
            }
        }
        if escalation.max_records_per_metric == 0 {
            return Err(ConfigError::ZeroRecordCap);
        }

        let intervals = [
            (
                "escalation.memory_check_interval_secs",
                escalation.memory_check_interval_secs,
            ),
            (
                "monitoring.cycle_interval_secs",
                config.monitoring.cycle_interval_secs,
            ),
            (
                "monitoring.persist_interval_secs",
                config.monitoring.persist_interval_secs,
            ),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroInterval(*field));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange(field, value))
    }
}
