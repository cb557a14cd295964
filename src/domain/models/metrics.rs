//! Point-in-time system metrics consumed by the planner and the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::metric_names;

/// Immutable snapshot of system health.
///
/// Values that could not be collected are reported as NaN and treated as
/// absent by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Normalised load, 1.0 meaning fully saturated
    pub system_load: f64,
    pub task_queue_depth: f64,
    /// Fraction of failed executions in [0, 1]
    pub error_rate: f64,
    pub response_time_ms: f64,
    pub memory_usage_mb: f64,
    pub cpu_load_pct: f64,
    pub captured_at: DateTime<Utc>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            system_load: 0.0,
            task_queue_depth: 0.0,
            error_rate: 0.0,
            response_time_ms: 0.0,
            memory_usage_mb: 0.0,
            cpu_load_pct: 0.0,
            captured_at: Utc::now(),
        }
    }
}

impl MetricsSnapshot {
    /// Look a metric up by name; `None` when unknown or not finite.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            metric_names::SYSTEM_LOAD => self.system_load,
            metric_names::TASK_QUEUE_DEPTH => self.task_queue_depth,
            metric_names::ERROR_RATE => self.error_rate,
            metric_names::RESPONSE_TIME_MS => self.response_time_ms,
            metric_names::MEMORY_USAGE_MB => self.memory_usage_mb,
            metric_names::CPU_LOAD_PCT => self.cpu_load_pct,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Overwrite a metric by name. Returns `false` for unknown names.
    pub fn set_metric(&mut self, name: &str, value: f64) -> bool {
        let slot = match name {
            metric_names::SYSTEM_LOAD => &mut self.system_load,
            metric_names::TASK_QUEUE_DEPTH => &mut self.task_queue_depth,
            metric_names::ERROR_RATE => &mut self.error_rate,
            metric_names::RESPONSE_TIME_MS => &mut self.response_time_ms,
            metric_names::MEMORY_USAGE_MB => &mut self.memory_usage_mb,
            metric_names::CPU_LOAD_PCT => &mut self.cpu_load_pct,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Observed effect of the most recently applied optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationImpact {
    /// Strategy the impact is attributed to, if known
    pub strategy: Option<String>,
    /// Change in response time; positive means slower
    pub response_time_delta_ms: f64,
    pub error_rate_delta: f64,
    pub memory_delta_mb: f64,
}

impl OptimizationImpact {
    /// Look an impact metric up by name; `None` when unknown or not finite.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            metric_names::RESPONSE_TIME_DELTA_MS => self.response_time_delta_ms,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}
