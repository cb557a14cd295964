//! Capability configuration and runtime statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::DispatcherConfig;

/// Per-capability execution settings supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapabilityConfig {
    /// Deadline for a single execution
    pub timeout_ms: u64,
    /// Retries a wrapping caller may spend before falling back
    pub max_retries: u32,
    /// Whether successful results are cached
    pub cache_eligible: bool,
    /// Lifetime of a cached result
    pub cache_ttl_ms: u64,
}

impl CapabilityConfig {
    /// Build a configuration from the dispatcher-wide defaults.
    pub const fn from_defaults(defaults: &DispatcherConfig) -> Self {
        Self {
            timeout_ms: defaults.default_timeout_ms,
            max_retries: defaults.default_max_retries,
            cache_eligible: false,
            cache_ttl_ms: defaults.default_cache_ttl_ms,
        }
    }

    /// Set the execution timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable result caching with the given TTL.
    #[must_use]
    pub const fn cached(mut self, ttl: Duration) -> Self {
        self.cache_eligible = true;
        self.cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Execution deadline as a `Duration`.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache TTL as a `Duration`.
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self::from_defaults(&DispatcherConfig::default())
    }
}

/// Whether a capability currently has executions in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Idle,
    Busy,
}

impl CapabilityStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
        }
    }
}

/// Runtime statistics of a registered capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStats {
    pub name: String,
    pub status: CapabilityStatus,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_execution_time_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Executions of this capability currently holding a slot
    pub in_flight: usize,
}

impl CapabilityStats {
    /// Fresh statistics for a newly registered capability.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CapabilityStatus::Idle,
            success_count: 0,
            error_count: 0,
            avg_execution_time_ms: 0.0,
            last_run_at: None,
            in_flight: 0,
        }
    }

    /// Total completed attempts.
    pub const fn attempts(&self) -> u64 {
        self.success_count + self.error_count
    }

    /// Fraction of attempts that failed (0 when never run).
    pub fn error_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.error_count as f64 / n as f64,
        }
    }

    /// Mark one execution as started.
    pub fn begin(&mut self) {
        self.in_flight += 1;
        self.status = CapabilityStatus::Busy;
    }

    /// Record a finished execution and fold its duration into the running mean.
    ///
    /// `avg' = (avg * (n - 1) + elapsed) / n` with `n` the attempts after this one.
    pub fn finish(&mut self, elapsed_ms: f64, success: bool, finished_at: DateTime<Utc>) {
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }

        let n = self.attempts() as f64;
        self.avg_execution_time_ms = self.avg_execution_time_ms.mul_add(n - 1.0, elapsed_ms) / n;
        self.last_run_at = Some(finished_at);

        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.status = CapabilityStatus::Idle;
        }
    }
}
