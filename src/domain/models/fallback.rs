//! Fallback history and chain outcomes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution history of a single fallback strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackHistory {
    pub attempts: u64,
    pub successes: u64,
    /// Cleared by the next success
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl FallbackHistory {
    /// `successes / attempts`, 0 when never attempted.
    pub fn success_rate(&self) -> f64 {
        match self.attempts {
            0 => 0.0,
            n => self.successes as f64 / n as f64,
        }
    }

    pub fn record_success(&mut self) {
        self.attempts += 1;
        self.successes += 1;
        self.last_failure_at = None;
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>) {
        self.attempts += 1;
        self.last_failure_at = Some(at);
    }

    /// Whether the last failure happened less than `window` before `now`.
    pub fn in_cooldown(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_failure_at
            .is_some_and(|failed_at| now - failed_at < window)
    }
}

/// Result of running a fallback chain.
///
/// `Exhausted` is a normal outcome; callers are expected to branch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FallbackOutcome {
    Recovered { strategy: String, output: Value },
    Exhausted { attempted: Vec<String> },
}

impl FallbackOutcome {
    pub const fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    /// Name of the strategy that recovered, if any.
    pub fn strategy(&self) -> Option<&str> {
        match self {
            Self::Recovered { strategy, .. } => Some(strategy),
            Self::Exhausted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_clears_failure() {
        let now = Utc::now();
        let mut history = FallbackHistory::default();
        assert!((history.success_rate() - 0.0).abs() < f64::EPSILON);

        history.record_failure(now);
        assert!(history.in_cooldown(now + Duration::seconds(30), Duration::seconds(60)));
        assert!(!history.in_cooldown(now + Duration::seconds(61), Duration::seconds(60)));

        history.record_success();
        assert_eq!(history.attempts, 2);
        assert_eq!(history.successes, 1);
        assert!(history.last_failure_at.is_none());
        assert!((history.success_rate() - 0.5).abs() < f64::EPSILON);
    }
}
