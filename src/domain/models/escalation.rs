//! Escalation records and the notifications raised from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Graduated urgency of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Statistical anomaly without a threshold breach
    Low,
    Medium,
    High,
}

impl Urgency {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// One threshold breach of a tracked metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub metric: String,
    pub value: f64,
    /// Effective threshold at the time of the breach
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_time_ms: Option<i64>,
}

impl EscalationRecord {
    /// Open a record for a breach observed at `timestamp`.
    pub fn breach(
        metric: impl Into<String>,
        value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            metric: metric.into(),
            value,
            threshold,
            timestamp,
            resolved: false,
            resolution_time_ms: None,
        }
    }

    /// Mark the record resolved. Has no effect on an already resolved record.
    pub fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolution_time_ms = Some((at - self.timestamp).num_milliseconds().max(0));
        true
    }

    /// How far above its threshold the breaching value was.
    pub fn severity(&self) -> f64 {
        if self.threshold > 0.0 {
            self.value / self.threshold
        } else {
            f64::INFINITY
        }
    }
}

/// Kind of condition that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ThresholdBreach,
    Anomaly,
    MemoryLeak,
}

/// Message pushed to notification sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub urgency: Urgency,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        urgency: Urgency,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            urgency,
            message: message.into(),
            timestamp,
            context: None,
            suggested_actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_suggested_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }
}

/// Persisted shape of the monitor's history.
///
/// A flat per-metric list of records plus the per-metric threshold
/// adjustment factors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    #[serde(default)]
    pub records: HashMap<String, Vec<EscalationRecord>>,
    #[serde(default)]
    pub adjustments: HashMap<String, f64>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}
