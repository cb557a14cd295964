use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure for Conductor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Task dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Retry policy used by the resilient submit path
    #[serde(default)]
    pub retry: RetryConfig,

    /// Strategy planner configuration
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Fallback controller configuration
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Escalation monitor configuration
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Monitoring loop configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Task dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatcherConfig {
    /// Global concurrency ceiling (1-1024)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout applied to capabilities registered without an explicit one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Retry budget for capabilities registered without an explicit one
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Result cache TTL for capabilities registered without an explicit one
    #[serde(default = "default_cache_ttl_ms")]
    pub default_cache_ttl_ms: u64,

    /// Maximum number of cached results
    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_cache_ttl_ms() -> u64 {
    300_000
}

const fn default_cache_max_capacity() -> u64 {
    10_000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout_ms: default_timeout_ms(),
            default_max_retries: default_max_retries(),
            default_cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_capacity: default_cache_max_capacity(),
        }
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Strategy planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerConfig {
    /// Upper bound on the size of a selected strategy combination
    #[serde(default = "default_max_strategies")]
    pub max_strategies: usize,

    /// How strongly system load inflates strategy cost
    #[serde(default = "default_load_cost_weight")]
    pub load_cost_weight: f64,

    /// Learn per-strategy cost corrections from real executions
    #[serde(default = "default_true")]
    pub adaptive_costs: bool,

    /// Learning rate of the adaptive cost correction, in (0, 1]
    #[serde(default = "default_planner_learning_rate")]
    pub learning_rate: f64,
}

const fn default_max_strategies() -> usize {
    3
}

const fn default_load_cost_weight() -> f64 {
    1.0
}

const fn default_planner_learning_rate() -> f64 {
    0.2
}

const fn default_true() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_strategies: default_max_strategies(),
            load_cost_weight: default_load_cost_weight(),
            adaptive_costs: true,
            learning_rate: default_planner_learning_rate(),
        }
    }
}

/// Fallback controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FallbackConfig {
    /// Re-rank strategies by success rate and cooldown before each chain
    #[serde(default = "default_true")]
    pub adaptive: bool,

    /// Window after a failure during which a strategy is penalised
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Multiplier applied to the score of a strategy in cooldown, in (0, 1]
    #[serde(default = "default_cooldown_penalty")]
    pub cooldown_penalty: f64,
}

const fn default_cooldown_secs() -> u64 {
    60
}

const fn default_cooldown_penalty() -> f64 {
    0.5
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            cooldown_secs: default_cooldown_secs(),
            cooldown_penalty: default_cooldown_penalty(),
        }
    }
}

/// Escalation monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationConfig {
    /// Base threshold per tracked metric
    #[serde(default = "default_thresholds")]
    pub thresholds: HashMap<String, f64>,

    /// Number of recent samples used for the z-score check
    #[serde(default = "default_anomaly_window")]
    pub anomaly_window: usize,

    /// Standard deviations from the rolling mean that count as an anomaly
    #[serde(default = "default_anomaly_z_score")]
    pub anomaly_z_score: f64,

    /// Window in which unresolved breaches count as consecutive
    #[serde(default = "default_consecutive_window_secs")]
    pub consecutive_window_secs: u64,

    /// Consecutive breaches at which urgency becomes high
    #[serde(default = "default_high_urgency_after")]
    pub high_urgency_after: usize,

    /// Consecutive breaches at which remediation actions are suggested
    #[serde(default = "default_suggest_actions_after")]
    pub suggest_actions_after: usize,

    /// Learning rate of the threshold adjustment factor, in (0, 1]
    #[serde(default = "default_escalation_learning_rate")]
    pub learning_rate: f64,

    /// Maximum records retained per metric
    #[serde(default = "default_max_records_per_metric")]
    pub max_records_per_metric: usize,

    /// Age after which resolved records are dropped
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Interval of the process memory growth check
    #[serde(default = "default_memory_check_interval_secs")]
    pub memory_check_interval_secs: u64,

    /// Growth per interval that raises a leak warning
    #[serde(default = "default_memory_growth_threshold_mb")]
    pub memory_growth_threshold_mb: f64,
}

/// Metric names understood by the escalation monitor.
pub mod metric_names {
    /// Fraction of failed executions
    pub const ERROR_RATE: &str = "error_rate";
    /// Normalised system load
    pub const SYSTEM_LOAD: &str = "system_load";
    /// Response time change reported by an optimization impact snapshot
    pub const RESPONSE_TIME_DELTA_MS: &str = "response_time_delta_ms";
    /// Average response time in milliseconds
    pub const RESPONSE_TIME_MS: &str = "response_time_ms";
    /// Pending queue depth
    pub const TASK_QUEUE_DEPTH: &str = "task_queue_depth";
    /// Memory usage in megabytes
    pub const MEMORY_USAGE_MB: &str = "memory_usage_mb";
    /// CPU load percentage
    pub const CPU_LOAD_PCT: &str = "cpu_load_pct";
}

fn default_thresholds() -> HashMap<String, f64> {
    HashMap::from([
        (metric_names::ERROR_RATE.to_string(), 0.1),
        (metric_names::SYSTEM_LOAD.to_string(), 0.85),
        (metric_names::RESPONSE_TIME_DELTA_MS.to_string(), 500.0),
    ])
}

const fn default_anomaly_window() -> usize {
    10
}

const fn default_anomaly_z_score() -> f64 {
    3.0
}

const fn default_consecutive_window_secs() -> u64 {
    300
}

const fn default_high_urgency_after() -> usize {
    3
}

const fn default_suggest_actions_after() -> usize {
    2
}

const fn default_escalation_learning_rate() -> f64 {
    0.1
}

const fn default_max_records_per_metric() -> usize {
    100
}

const fn default_retention_hours() -> u64 {
    24
}

const fn default_memory_check_interval_secs() -> u64 {
    60
}

const fn default_memory_growth_threshold_mb() -> f64 {
    100.0
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            anomaly_window: default_anomaly_window(),
            anomaly_z_score: default_anomaly_z_score(),
            consecutive_window_secs: default_consecutive_window_secs(),
            high_urgency_after: default_high_urgency_after(),
            suggest_actions_after: default_suggest_actions_after(),
            learning_rate: default_escalation_learning_rate(),
            max_records_per_metric: default_max_records_per_metric(),
            retention_hours: default_retention_hours(),
            memory_check_interval_secs: default_memory_check_interval_secs(),
            memory_growth_threshold_mb: default_memory_growth_threshold_mb(),
        }
    }
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitoringConfig {
    /// Interval between planner/monitor cycles
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Where escalation history is persisted (disabled when unset)
    #[serde(default)]
    pub history_path: Option<PathBuf>,

    /// Interval between history snapshots
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
}

const fn default_cycle_interval_secs() -> u64 {
    30
}

const fn default_persist_interval_secs() -> u64 {
    300
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            history_path: None,
            persist_interval_secs: default_persist_interval_secs(),
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

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to stdout when writing to files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Rotation policy for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: default_rotation(),
        }
    }
}
