use serde::{Deserialize, Serialize};

use super::capacity::CapacityConstraints;

/// Main configuration structure for the scheduling engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Scheduling behaviour and new-user defaults
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Whether capacity violations block a mutation or only warn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Capacity violations are reported as warnings
    #[default]
    Soft,
    /// Capacity violations are reported as conflicts and fail validation
    Hard,
}

/// Scheduling engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulingConfig {
    /// How capacity violations are treated
    #[serde(default)]
    pub capacity_policy: CapacityPolicy,

    /// Days searched when a slot query has no end date
    #[serde(default = "default_search_days")]
    pub default_search_days: u32,

    /// Days searched for alternative slots after a conflict
    #[serde(default = "default_suggestion_window_days")]
    pub suggestion_window_days: u32,

    /// Alternative slots attached to a failed add/update
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Window around a slot in which existing items count as nearby
    #[serde(default = "default_nearby_conflict_window_minutes")]
    pub nearby_conflict_window_minutes: u32,

    /// Undo entries kept (1-10)
    #[serde(default = "default_undo_history_limit")]
    pub undo_history_limit: usize,

    /// Day load ratio above which a day counts as overloaded
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: f64,

    /// IANA timezone for new users
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Capacity limits for new users
    #[serde(default = "CapacityConstraints::conservative")]
    pub default_capacity: CapacityConstraints,

    /// Start of the default working day, HH:MM
    #[serde(default = "default_work_start")]
    pub default_work_start: String,

    /// End of the default working day, HH:MM
    #[serde(default = "default_work_end")]
    pub default_work_end: String,

    /// Whether the default weekly pattern includes weekends
    #[serde(default)]
    pub work_on_weekends: bool,
}

const fn default_search_days() -> u32 {
    14
}

const fn default_suggestion_window_days() -> u32 {
    7
}

const fn default_max_suggestions() -> usize {
    5
}

const fn default_nearby_conflict_window_minutes() -> u32 {
    60
}

/// Hard ceiling on undo history length.
pub const MAX_UNDO_HISTORY: usize = 10;

const fn default_undo_history_limit() -> usize {
    MAX_UNDO_HISTORY
}

const fn default_overload_threshold() -> f64 {
    0.8
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_work_start() -> String {
    "09:00".to_string()
}

fn default_work_end() -> String {
    "18:00".to_string()
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            capacity_policy: CapacityPolicy::default(),
            default_search_days: default_search_days(),
            suggestion_window_days: default_suggestion_window_days(),
            max_suggestions: default_max_suggestions(),
            nearby_conflict_window_minutes: default_nearby_conflict_window_minutes(),
            undo_history_limit: default_undo_history_limit(),
            overload_threshold: default_overload_threshold(),
            default_timezone: default_timezone(),
            default_capacity: CapacityConstraints::conservative(),
            default_work_start: default_work_start(),
            default_work_end: default_work_end(),
            work_on_weekends: false,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".worldstate/worldstate.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}
