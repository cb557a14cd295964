use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::StrategyError;
use crate::domain::models::{MetricsSnapshot, StrategyReport};

/// Port for a runtime optimization the planner can select.
///
/// Strategies are immutable once registered; the planner only reads their
/// applicability, effect model and base figures.
#[async_trait]
pub trait OptimizationStrategy: Send + Sync {
    /// Unique strategy name
    fn name(&self) -> &str;

    /// Applicability to the given metrics in `[0, 1]`; 0 excludes the strategy.
    fn evaluate(&self, metrics: &MetricsSnapshot) -> f64;

    /// Metrics expected after applying this strategy.
    ///
    /// The default effect model assumes no change.
    fn simulate(&self, metrics: &MetricsSnapshot) -> MetricsSnapshot {
        *metrics
    }

    /// Nominal cost before load scaling and learned corrections
    fn base_cost(&self) -> f64;

    /// Nominal benefit at full applicability
    fn base_benefit(&self) -> f64;

    /// Strategies that must already be selected for this one to be admitted
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Strategies that must not be selected alongside this one
    fn conflicts(&self) -> &[String] {
        &[]
    }

    /// Apply the strategy.
    async fn execute(&self, parameters: &Value) -> Result<StrategyReport, StrategyError>;
}

/// Port for an alternative recovery approach in a fallback chain.
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Static priority; higher runs first and breaks score ties
    fn priority(&self) -> i32;

    /// Whether the strategy applies to the current metrics
    fn evaluate(&self, metrics: &MetricsSnapshot) -> bool;

    async fn execute(&self, metrics: &MetricsSnapshot) -> Result<Value, StrategyError>;
}
