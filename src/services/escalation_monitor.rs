//! Escalation monitor.
//!
//! Observes metrics snapshots (and optionally the impact of the last
//! optimization) and raises graduated notifications:
//!
//! - a z-score check against a rolling window per metric flags statistical
//!   anomalies (`Low` urgency, no record);
//! - a breach of `base_threshold * adjustment_factor` opens an
//!   [`EscalationRecord`] and raises a `Medium` notification, `High` once the
//!   metric has breached repeatedly within the consecutive window;
//! - a cleared metric resolves its open records and nudges the adjustment
//!   factor, clamped to `[1.0, 1.5]`.
//!
//! Missing or non-finite metrics are skipped; evaluation never fails.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::config::metric_names;
use crate::domain::models::{
    EscalationConfig, EscalationRecord, EscalationState, MetricsSnapshot, Notification,
    NotificationKind, OptimizationImpact, Urgency,
};
use crate::domain::ports::NotificationSink;

const MIN_FACTOR: f64 = 1.0;
const MAX_FACTOR: f64 = 1.5;
/// Breaches this far above base push the threshold towards tolerance
const TOLERANCE_RATIO: f64 = 1.5;
/// Clearing this far below base pulls the threshold back towards base
const SENSITIVITY_RATIO: f64 = 0.7;

/// Snapshot metrics watched for anomalies.
const ANOMALY_METRICS: [&str; 6] = [
    metric_names::SYSTEM_LOAD,
    metric_names::TASK_QUEUE_DEPTH,
    metric_names::ERROR_RATE,
    metric_names::RESPONSE_TIME_MS,
    metric_names::MEMORY_USAGE_MB,
    metric_names::CPU_LOAD_PCT,
];

pub struct EscalationMonitor {
    config: EscalationConfig,
    records: HashMap<String, VecDeque<EscalationRecord>>,
    adjustments: HashMap<String, f64>,
    samples: HashMap<String, VecDeque<f64>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl EscalationMonitor {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            adjustments: HashMap::new(),
            samples: HashMap::new(),
            sinks: Vec::new(),
        }
    }

    /// Attach a sink that receives every notification.
    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub const fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Current adjustment factor of a metric.
    pub fn adjustment_factor(&self, metric: &str) -> f64 {
        self.adjustments.get(metric).copied().unwrap_or(MIN_FACTOR)
    }

    /// Base threshold times adjustment factor; `None` for untracked metrics.
    pub fn effective_threshold(&self, metric: &str) -> Option<f64> {
        self.config
            .thresholds
            .get(metric)
            .map(|base| base * self.adjustment_factor(metric))
    }

    /// Retained records of a metric, oldest first.
    pub fn records(&self, metric: &str) -> Vec<EscalationRecord> {
        self.records
            .get(metric)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Unresolved records of a metric.
    pub fn open_breaches(&self, metric: &str) -> usize {
        self.records
            .get(metric)
            .map_or(0, |r| r.iter().filter(|rec| !rec.resolved).count())
    }

    /// Evaluate a snapshot now.
    pub fn evaluate(
        &mut self,
        metrics: &MetricsSnapshot,
        impact: Option<&OptimizationImpact>,
    ) -> Vec<Notification> {
        self.evaluate_at(metrics, impact, Utc::now())
    }

    /// Evaluate a snapshot as of `now`, deliver the resulting notifications
    /// to every sink and return them.
    pub fn evaluate_at(
        &mut self,
        metrics: &MetricsSnapshot,
        impact: Option<&OptimizationImpact>,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let mut notifications = Vec::new();

        let mut observed: Vec<(&str, f64)> = ANOMALY_METRICS
            .iter()
            .filter_map(|&name| metrics.metric(name).map(|v| (name, v)))
            .collect();
        if let Some(delta) = impact.and_then(|i| i.metric(metric_names::RESPONSE_TIME_DELTA_MS)) {
            observed.push((metric_names::RESPONSE_TIME_DELTA_MS, delta));
        }

        for (name, value) in &observed {
            if let Some(notification) = self.check_anomaly(name, *value, now) {
                notifications.push(notification);
            }
        }

        let mut tracked: Vec<(String, f64)> = self
            .config
            .thresholds
            .iter()
            .map(|(name, base)| (name.clone(), *base))
            .collect();
        tracked.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, base) in tracked {
            let Some(value) = observed
                .iter()
                .find(|(metric, _)| *metric == name)
                .map(|(_, v)| *v)
            else {
                continue;
            };
            if let Some(notification) = self.check_threshold(&name, value, base, now) {
                notifications.push(notification);
            }
        }

        self.prune(now);

        for notification in &notifications {
            for sink in &self.sinks {
                sink.deliver(notification);
            }
        }
        notifications
    }

    /// Z-score check against the rolling window, then record the sample.
    fn check_anomaly(
        &mut self,
        metric: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let window = self.samples.entry(metric.to_string()).or_default();

        let mut notification = None;
        if window.len() >= 2 {
            let n = window.len() as f64;
            let mean = window.iter().sum::<f64>() / n;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();

            if std_dev > f64::EPSILON {
                let z_score = (value - mean).abs() / std_dev;
                if z_score > self.config.anomaly_z_score {
                    debug!(metric, value, mean, std_dev, z_score, "Anomaly detected");
                    notification = Some(
                        Notification::new(
                            NotificationKind::Anomaly,
                            Urgency::Low,
                            format!(
                                "Anomalous {metric}: {value:.3} is {z_score:.1} standard deviations from the recent mean {mean:.3}"
                            ),
                            now,
                        )
                        .with_context(json!({
                            "metric": metric,
                            "value": value,
                            "mean": mean,
                            "std_dev": std_dev,
                            "z_score": z_score,
                        })),
                    );
                }
            }
        }

        window.push_back(value);
        while window.len() > self.config.anomaly_window.max(2) {
            window.pop_front();
        }
        notification
    }

    fn check_threshold(
        &mut self,
        metric: &str,
        value: f64,
        base: f64,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let factor = self.adjustment_factor(metric);
        let threshold = base * factor;

        if value <= threshold {
            self.resolve(metric, value, base, now);
            return None;
        }

        let window = seconds(self.config.consecutive_window_secs);
        let history = self.records.entry(metric.to_string()).or_default();
        let consecutive = history
            .iter()
            .filter(|r| !r.resolved && now - r.timestamp <= window)
            .count()
            + 1;
        history.push_back(EscalationRecord::breach(metric, value, threshold, now));

        let urgency = if consecutive >= self.config.high_urgency_after {
            Urgency::High
        } else {
            Urgency::Medium
        };

        let mut notification = Notification::new(
            NotificationKind::ThresholdBreach,
            urgency,
            format!(
                "{metric} at {value:.3} exceeds threshold {threshold:.3} ({consecutive} consecutive breach{})",
                if consecutive == 1 { "" } else { "es" }
            ),
            now,
        )
        .with_context(json!({
            "metric": metric,
            "value": value,
            "threshold": threshold,
            "base_threshold": base,
            "adjustment_factor": factor,
            "consecutive": consecutive,
        }));

        if consecutive >= self.config.suggest_actions_after {
            notification = notification.with_suggested_actions(suggested_actions(metric));
        }
        Some(notification)
    }

    /// Resolve every open record of a metric and adapt its threshold.
    fn resolve(&mut self, metric: &str, value: f64, base: f64, now: DateTime<Utc>) {
        let Some(history) = self.records.get_mut(metric) else {
            return;
        };

        let mut breach_values = Vec::new();
        for record in history.iter_mut() {
            if record.resolve(now) {
                breach_values.push(record.value);
            }
        }
        if breach_values.is_empty() {
            return;
        }

        debug!(metric, resolved = breach_values.len(), "Breach resolved");
        for breach_value in breach_values {
            self.adapt(metric, breach_value, value, base);
        }
    }

    /// Exponential smoothing of the adjustment factor towards 1.5 after
    /// severe breaches, or back towards 1.0 when the metric clears well below
    /// base.
    fn adapt(&mut self, metric: &str, breach_value: f64, clear_value: f64, base: f64) {
        let target = if breach_value > base * TOLERANCE_RATIO {
            MAX_FACTOR
        } else if clear_value < base * SENSITIVITY_RATIO {
            MIN_FACTOR
        } else {
            return;
        };

        let rate = self.config.learning_rate;
        let factor = self
            .adjustments
            .entry(metric.to_string())
            .or_insert(MIN_FACTOR);
        *factor = factor.mul_add(1.0 - rate, target * rate).clamp(MIN_FACTOR, MAX_FACTOR);
        debug!(metric, factor = *factor, "Threshold adjustment updated");
    }

    /// Drop resolved records past retention, then cap each history oldest-first.
    fn prune(&mut self, now: DateTime<Utc>) {
        let retention = seconds(self.config.retention_hours.saturating_mul(3_600));
        let cap = self.config.max_records_per_metric;

        for history in self.records.values_mut() {
            history.retain(|r| !(r.resolved && now - r.timestamp > retention));
            while history.len() > cap {
                history.pop_front();
            }
        }
        self.records.retain(|_, history| !history.is_empty());
    }

    /// Persistable copy of records and adjustment factors.
    pub fn export_state(&self) -> EscalationState {
        EscalationState {
            records: self
                .records
                .iter()
                .map(|(metric, history)| (metric.clone(), history.iter().cloned().collect()))
                .collect(),
            adjustments: self.adjustments.clone(),
            saved_at: Some(Utc::now()),
        }
    }

    /// Replace history with a previously exported state.
    ///
    /// Factors are clamped to `[1.0, 1.5]`; non-finite factors are dropped.
    pub fn restore_state(&mut self, state: EscalationState) {
        self.records = state
            .records
            .into_iter()
            .map(|(metric, mut history)| {
                history.sort_by_key(|r| r.timestamp);
                (metric, history.into_iter().collect())
            })
            .collect();
        self.adjustments = state
            .adjustments
            .into_iter()
            .filter(|(_, factor)| factor.is_finite())
            .map(|(metric, factor)| (metric, factor.clamp(MIN_FACTOR, MAX_FACTOR)))
            .collect();
        self.prune(Utc::now());
    }
}

/// Saturating conversion of a configured number of seconds.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn suggested_actions(metric: &str) -> Vec<String> {
    let actions: &[&str] = match metric {
        metric_names::ERROR_RATE => &[
            "Inspect recent capability failures",
            "Route affected work through fallback strategies",
            "Reduce concurrency for failing capabilities",
        ],
        metric_names::SYSTEM_LOAD => &[
            "Lower the dispatcher concurrency ceiling",
            "Defer or shed low-priority work",
        ],
        metric_names::RESPONSE_TIME_DELTA_MS => &[
            "Roll back the most recently applied optimization",
            "Review the selected strategy plan",
        ],
        _ => &["Investigate the metric trend"],
    };
    actions.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for Collecting {
        fn deliver(&self, notification: &Notification) {
            self.seen.lock().unwrap().push(notification.clone());
        }
    }

    fn errors(rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            error_rate: rate,
            ..Default::default()
        }
    }

    fn breaches(notifications: &[Notification]) -> Vec<&Notification> {
        notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::ThresholdBreach)
            .collect()
    }

    #[test]
    fn test_breach_creates_record_and_notification() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let sink = Arc::new(Collecting::default());
        monitor.add_sink(sink.clone());

        let out = monitor.evaluate(&errors(0.3), None);
        let breach = breaches(&out);
        assert_eq!(breach.len(), 1);
        assert_eq!(breach[0].urgency, Urgency::Medium);
        assert!(breach[0].message.contains("error_rate"));
        assert!(breach[0].suggested_actions.is_empty());
        assert_eq!(monitor.open_breaches("error_rate"), 1);
        assert_eq!(sink.seen.lock().unwrap().len(), out.len());
    }

    #[test]
    fn test_consecutive_breaches_escalate() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let start = Utc::now();

        let first = monitor.evaluate_at(&errors(0.3), None, start);
        let second = monitor.evaluate_at(&errors(0.3), None, start + Duration::seconds(30));
        let third = monitor.evaluate_at(&errors(0.3), None, start + Duration::seconds(60));

        assert_eq!(breaches(&first)[0].urgency, Urgency::Medium);
        assert_eq!(breaches(&second)[0].urgency, Urgency::Medium);
        assert!(!breaches(&second)[0].suggested_actions.is_empty());
        assert_eq!(breaches(&third)[0].urgency, Urgency::High);
    }

    #[test]
    fn test_old_open_breaches_do_not_count_as_consecutive() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let start = Utc::now();

        monitor.evaluate_at(&errors(0.3), None, start);
        monitor.evaluate_at(&errors(0.3), None, start + Duration::seconds(10));
        let late = monitor.evaluate_at(&errors(0.3), None, start + Duration::minutes(20));
        assert_eq!(breaches(&late)[0].urgency, Urgency::Medium);
    }

    #[test]
    fn test_threshold_adapts_after_severe_breaches() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let base = 0.1;
        let mut now = Utc::now();

        for _ in 0..30 {
            monitor.evaluate_at(&errors(0.5), None, now);
            now += Duration::minutes(1);
            monitor.evaluate_at(&errors(0.0), None, now);
            now += Duration::minutes(1);
        }

        let threshold = monitor.effective_threshold("error_rate").unwrap();
        assert!(threshold > base);
        assert!(threshold <= base * 1.5 + 1e-12);
        assert!(monitor.records("error_rate").iter().all(|r| r.resolved));
    }

    #[test]
    fn test_resolution_time_recorded() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let start = Utc::now();
        monitor.evaluate_at(&errors(0.12), None, start);
        monitor.evaluate_at(&errors(0.05), None, start + Duration::seconds(3));

        let records = monitor.records("error_rate");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resolution_time_ms, Some(3_000));
        // 0.12 is within 1.5x base; 0.05 clears below 0.7x base.
        assert!((monitor.adjustment_factor("error_rate") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_anomaly_is_low_urgency_without_record() {
        let config = EscalationConfig {
            thresholds: HashMap::new(),
            ..Default::default()
        };
        let mut monitor = EscalationMonitor::new(config);
        let now = Utc::now();

        for i in 0..10 {
            let load = if i % 2 == 0 { 0.30 } else { 0.32 };
            let snapshot = MetricsSnapshot {
                system_load: load,
                ..Default::default()
            };
            assert!(monitor.evaluate_at(&snapshot, None, now).is_empty());
        }

        let spike = MetricsSnapshot {
            system_load: 0.9,
            ..Default::default()
        };
        let out = monitor.evaluate_at(&spike, None, now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, NotificationKind::Anomaly);
        assert_eq!(out[0].urgency, Urgency::Low);
        assert!(monitor.records("system_load").is_empty());
    }

    #[test]
    fn test_impact_delta_and_missing_metrics() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        let impact = OptimizationImpact {
            strategy: Some("batching".to_string()),
            response_time_delta_ms: 900.0,
            error_rate_delta: 0.0,
            memory_delta_mb: 0.0,
        };
        let snapshot = MetricsSnapshot {
            error_rate: f64::NAN,
            ..Default::default()
        };

        let out = monitor.evaluate(&snapshot, Some(&impact));
        let breach = breaches(&out);
        assert_eq!(breach.len(), 1);
        assert!(breach[0].message.starts_with("response_time_delta_ms"));
        assert!(monitor.records("error_rate").is_empty());
    }

    #[test]
    fn test_pruning_caps_and_expires() {
        let config = EscalationConfig {
            max_records_per_metric: 3,
            ..Default::default()
        };
        let mut monitor = EscalationMonitor::new(config);
        let start = Utc::now() - Duration::hours(48);

        for i in 0..5 {
            monitor.evaluate_at(&errors(0.3), None, start + Duration::seconds(i));
        }
        assert_eq!(monitor.records("error_rate").len(), 3);
        assert_eq!(
            monitor.records("error_rate")[0].timestamp,
            start + Duration::seconds(2)
        );

        monitor.evaluate_at(&errors(0.0), None, start + Duration::seconds(10));
        monitor.evaluate_at(&errors(0.0), None, start + Duration::hours(30));
        assert!(monitor.records("error_rate").is_empty());
    }

    #[test]
    fn test_state_round_trip_clamps_factors() {
        let mut monitor = EscalationMonitor::new(EscalationConfig::default());
        monitor.evaluate(&errors(0.3), None);

        let mut state = monitor.export_state();
        state.adjustments.insert("system_load".to_string(), 7.0);
        state.adjustments.insert("error_rate".to_string(), f64::NAN);

        let mut restored = EscalationMonitor::new(EscalationConfig::default());
        restored.restore_state(state);
        assert_eq!(restored.open_breaches("error_rate"), 1);
        assert!((restored.adjustment_factor("system_load") - 1.5).abs() < 1e-12);
        assert!((restored.adjustment_factor("error_rate") - 1.0).abs() < 1e-12);
    }
}
