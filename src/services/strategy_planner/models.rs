//! Pluggable cost and benefit models.
//!
//! The defaults are deliberately simple linear policies; deployments are
//! expected to supply models calibrated to their own workloads.

use std::collections::HashMap;
use tracing::debug;

use crate::domain::models::{MetricsSnapshot, PlanningContext};
use crate::domain::ports::OptimizationStrategy;

/// Estimates the cost of applying a strategy in a given state.
pub trait CostModel: Send + Sync {
    fn cost(
        &self,
        strategy: &dyn OptimizationStrategy,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
    ) -> f64;

    /// Feed back the cost actually incurred by a real execution.
    fn observe(&mut self, _strategy: &str, _expected: f64, _actual: f64) {}
}

/// Estimates the benefit of applying a strategy in a given state.
pub trait BenefitModel: Send + Sync {
    fn benefit(
        &self,
        strategy: &dyn OptimizationStrategy,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
    ) -> f64;
}

/// Cost grows linearly with system load: `base * (1 + weight * load)`.
#[derive(Debug, Clone)]
pub struct LinearLoadCostModel {
    pub load_weight: f64,
}

impl LinearLoadCostModel {
    pub const fn new(load_weight: f64) -> Self {
        Self { load_weight }
    }
}

impl Default for LinearLoadCostModel {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl CostModel for LinearLoadCostModel {
    fn cost(
        &self,
        strategy: &dyn OptimizationStrategy,
        metrics: &MetricsSnapshot,
        _context: &PlanningContext,
    ) -> f64 {
        let load = if metrics.system_load.is_finite() {
            metrics.system_load.max(0.0)
        } else {
            0.0
        };
        strategy.base_cost() * self.load_weight.mul_add(load, 1.0)
    }
}

const MIN_FACTOR: f64 = 0.1;
const MAX_FACTOR: f64 = 10.0;

/// Wraps another cost model with a learned per-strategy correction factor.
///
/// After each real execution the factor moves towards the observed
/// actual/expected ratio: `factor *= 1 + rate * (ratio - 1)`, clamped to
/// `[0.1, 10]`.
pub struct AdaptiveCostModel {
    inner: Box<dyn CostModel>,
    factors: HashMap<String, f64>,
    learning_rate: f64,
}

impl AdaptiveCostModel {
    pub fn new(inner: Box<dyn CostModel>, learning_rate: f64) -> Self {
        Self {
            inner,
            factors: HashMap::new(),
            learning_rate: learning_rate.clamp(f64::EPSILON, 1.0),
        }
    }

    /// Current correction factor of a strategy (1.0 when never observed).
    pub fn factor(&self, strategy: &str) -> f64 {
        self.factors.get(strategy).copied().unwrap_or(1.0)
    }
}

impl CostModel for AdaptiveCostModel {
    fn cost(
        &self,
        strategy: &dyn OptimizationStrategy,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
    ) -> f64 {
        self.inner.cost(strategy, metrics, context) * self.factor(strategy.name())
    }

    fn observe(&mut self, strategy: &str, expected: f64, actual: f64) {
        if !(expected > 0.0 && expected.is_finite() && actual.is_finite() && actual >= 0.0) {
            return;
        }
        let ratio = actual / expected;
        let factor = self.factors.entry(strategy.to_string()).or_insert(1.0);
        *factor = (*factor * self.learning_rate.mul_add(ratio - 1.0, 1.0))
            .clamp(MIN_FACTOR, MAX_FACTOR);
        debug!(strategy, ratio, factor = *factor, "Cost correction updated");
    }
}

/// Benefit is the strategy's applicability times its nominal benefit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicabilityBenefitModel;

impl BenefitModel for ApplicabilityBenefitModel {
    fn benefit(
        &self,
        strategy: &dyn OptimizationStrategy,
        metrics: &MetricsSnapshot,
        _context: &PlanningContext,
    ) -> f64 {
        let applicability = strategy.evaluate(metrics);
        if applicability.is_finite() {
            applicability.clamp(0.0, 1.0) * strategy.base_benefit()
        } else {
            0.0
        }
    }
}
