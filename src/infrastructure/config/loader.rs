use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, MAX_UNDO_HISTORY};
use crate::domain::models::CapacityConstraints;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid undo_history_limit: {0}. Must be between 1 and {MAX_UNDO_HISTORY}")]
    InvalidUndoHistoryLimit(usize),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid time of day '{0}'. Expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("Default working day is empty: {start} to {end}")]
    EmptyWorkingDay { start: String, end: String },

    #[error("Invalid overload_threshold: {0}. Must be in (0, 1]")]
    InvalidOverloadThreshold(f64),

    #[error("Invalid default_search_days: {0}. Must be at least 1")]
    InvalidSearchDays(u32),

    #[error("Invalid capacity limit {field}: {value}. Must be positive")]
    InvalidCapacityLimit { field: &'static str, value: f64 },
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .worldstate/config.yaml
    /// 3. .worldstate/local.yaml (optional local overrides)
    /// 4. Environment variables (WORLDSTATE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".worldstate/config.yaml"))
            .merge(Yaml::file(".worldstate/local.yaml"))
            .merge(Env::prefixed("WORLDSTATE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("WORLDSTATE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let scheduling = &config.scheduling;

        if !(1..=MAX_UNDO_HISTORY).contains(&scheduling.undo_history_limit) {
            return Err(ConfigError::InvalidUndoHistoryLimit(scheduling.undo_history_limit));
        }

        if scheduling.default_timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidTimezone(scheduling.default_timezone.clone()));
        }

        let start = parse_time_of_day(&scheduling.default_work_start)?;
        let end = parse_time_of_day(&scheduling.default_work_end)?;
        if start == end {
            return Err(ConfigError::EmptyWorkingDay {
                start: scheduling.default_work_start.clone(),
                end: scheduling.default_work_end.clone(),
            });
        }

        if !(scheduling.overload_threshold > 0.0 && scheduling.overload_threshold <= 1.0) {
            return Err(ConfigError::InvalidOverloadThreshold(scheduling.overload_threshold));
        }

        if scheduling.default_search_days == 0 {
            return Err(ConfigError::InvalidSearchDays(scheduling.default_search_days));
        }

        validate_capacity(&scheduling.default_capacity)?;

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
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
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidTimeOfDay(value.to_string()))
}

fn validate_capacity(limits: &CapacityConstraints) -> Result<(), ConfigError> {
    let checks = [
        ("max_hours_per_day", limits.max_hours_per_day),
        ("max_hours_per_week", limits.max_hours_per_week),
        ("max_consecutive_hours", limits.max_consecutive_hours),
        ("max_items_per_day", f64::from(limits.max_items_per_day)),
    ];
    for (field, value) in checks {
        if value <= 0.0 || value.is_nan() {
            return Err(ConfigError::InvalidCapacityLimit { field, value });
        }
    }
    Ok(())
}
