//! Data-driven optimization and fallback strategies.
//!
//! `TunableStrategy` describes an optimization purely by numbers: a nominal
//! cost and benefit, an optional metric trigger and multiplicative effects on
//! metrics. It backs the `simulate` command and is convenient in tests.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::errors::StrategyError;
use crate::domain::models::{MetricsSnapshot, StrategyReport};
use crate::domain::ports::{FallbackStrategy, OptimizationStrategy};

#[derive(Debug, Clone)]
struct Trigger {
    metric: String,
    floor: f64,
    full: f64,
}

/// Optimization strategy defined by plain figures.
#[derive(Debug, Clone)]
pub struct TunableStrategy {
    name: String,
    base_cost: f64,
    base_benefit: f64,
    trigger: Option<Trigger>,
    effects: Vec<(String, f64)>,
    dependencies: Vec<String>,
    conflicts: Vec<String>,
    cost_drift: f64,
    fails: bool,
}

impl TunableStrategy {
    /// An always-applicable strategy with no effect on metrics.
    pub fn new(name: impl Into<String>, base_cost: f64, base_benefit: f64) -> Self {
        Self {
            name: name.into(),
            base_cost,
            base_benefit,
            trigger: None,
            effects: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            cost_drift: 1.0,
            fails: false,
        }
    }

    /// Applicability ramps linearly from 0 at `floor` to 1 at `full`.
    #[must_use]
    pub fn triggered_by(mut self, metric: impl Into<String>, floor: f64, full: f64) -> Self {
        self.trigger = Some(Trigger {
            metric: metric.into(),
            floor,
            full,
        });
        self
    }

    /// Multiply `metric` by `factor` in the simulated post-strategy state.
    #[must_use]
    pub fn with_effect(mut self, metric: impl Into<String>, factor: f64) -> Self {
        self.effects.push((metric.into(), factor));
        self
    }

    #[must_use]
    pub fn requires(mut self, strategy: impl Into<String>) -> Self {
        self.dependencies.push(strategy.into());
        self
    }

    #[must_use]
    pub fn conflicts_with(mut self, strategy: impl Into<String>) -> Self {
        self.conflicts.push(strategy.into());
        self
    }

    /// Report `base_cost * drift` as the actual cost of each execution.
    #[must_use]
    pub const fn with_cost_drift(mut self, drift: f64) -> Self {
        self.cost_drift = drift;
        self
    }

    /// Make every execution fail.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fails = true;
        self
    }
}

#[async_trait]
impl OptimizationStrategy for TunableStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, metrics: &MetricsSnapshot) -> f64 {
        let Some(trigger) = &self.trigger else {
            return 1.0;
        };
        let Some(value) = metrics.metric(&trigger.metric) else {
            return 0.0;
        };
        if value <= trigger.floor {
            0.0
        } else if value >= trigger.full || trigger.full <= trigger.floor {
            1.0
        } else {
            (value - trigger.floor) / (trigger.full - trigger.floor)
        }
    }

    fn simulate(&self, metrics: &MetricsSnapshot) -> MetricsSnapshot {
        let mut projected = *metrics;
        for (metric, factor) in &self.effects {
            if let Some(value) = projected.metric(metric) {
                projected.set_metric(metric, value * factor);
            }
        }
        projected
    }

    fn base_cost(&self) -> f64 {
        self.base_cost
    }

    fn base_benefit(&self) -> f64 {
        self.base_benefit
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn conflicts(&self) -> &[String] {
        &self.conflicts
    }

    async fn execute(&self, parameters: &Value) -> Result<StrategyReport, StrategyError> {
        if self.fails {
            return Err(StrategyError::failed(&self.name, "strategy rejected the request"));
        }
        Ok(StrategyReport::new(json!({
            "strategy": self.name,
            "parameters": parameters,
        }))
        .with_cost(self.base_cost * self.cost_drift))
    }
}

/// Fallback that degrades to a fixed response when a metric is high enough.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    name: String,
    priority: i32,
    min_error_rate: f64,
    response: Value,
}

impl StaticFallback {
    pub fn new(name: impl Into<String>, priority: i32, response: Value) -> Self {
        Self {
            name: name.into(),
            priority,
            min_error_rate: 0.0,
            response,
        }
    }

    /// Only apply once the error rate reaches `rate`.
    #[must_use]
    pub const fn when_error_rate_at_least(mut self, rate: f64) -> Self {
        self.min_error_rate = rate;
        self
    }
}

#[async_trait]
impl FallbackStrategy for StaticFallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, metrics: &MetricsSnapshot) -> bool {
        metrics
            .metric("error_rate")
            .is_some_and(|rate| rate >= self.min_error_rate)
    }

    async fn execute(&self, _metrics: &MetricsSnapshot) -> Result<Value, StrategyError> {
        Ok(self.response.clone())
    }
}
