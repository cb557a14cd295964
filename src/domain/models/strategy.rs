//! Optimization plans and the reports produced when executing them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::metrics::MetricsSnapshot;

/// Caller supplied context for one planning call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningContext {
    /// Combinations whose cumulative cost exceeds this are never admitted
    #[serde(default)]
    pub cost_budget: Option<f64>,
    /// Opaque hints made available to cost and benefit models
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl PlanningContext {
    #[must_use]
    pub const fn with_budget(mut self, budget: f64) -> Self {
        self.cost_budget = Some(budget);
        self
    }
}

/// Selected combination of optimization strategies.
///
/// An empty plan means no compatible, non-empty combination was feasible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Strategy names in the order they were selected
    pub strategies: Vec<String>,
    pub estimated_benefit: f64,
    pub estimated_cost: f64,
    /// Estimated cost of each selected strategy, aligned with `strategies`
    #[serde(default)]
    pub step_costs: Vec<f64>,
    /// Metrics expected after every selected strategy has been applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_metrics: Option<MetricsSnapshot>,
}

impl Plan {
    /// The infeasible plan.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Benefit per unit cost; the raw benefit when the plan is free.
    pub fn efficiency(&self) -> f64 {
        efficiency(self.estimated_benefit, self.estimated_cost)
    }
}

/// Benefit/cost ratio, falling back to benefit alone for zero cost.
pub fn efficiency(benefit: f64, cost: f64) -> f64 {
    if cost > 0.0 {
        benefit / cost
    } else {
        benefit
    }
}

/// Result of a successful strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub output: Value,
    /// Cost actually incurred, when the strategy can measure it
    pub actual_cost: Option<f64>,
}

impl StrategyReport {
    pub const fn new(output: Value) -> Self {
        Self {
            output,
            actual_cost: None,
        }
    }

    #[must_use]
    pub const fn with_cost(mut self, cost: f64) -> Self {
        self.actual_cost = Some(cost);
        self
    }
}

/// Outcome of one step of an executed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub strategy: String,
    pub expected_cost: f64,
    pub actual_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_efficiency() {
        let plan = Plan {
            strategies: vec!["q".to_string()],
            estimated_benefit: 4.0,
            estimated_cost: 1.0,
            step_costs: vec![1.0],
            projected_metrics: None,
        };
        assert!((plan.efficiency() - 4.0).abs() < f64::EPSILON);
        assert!((efficiency(3.0, 0.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::empty();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }
}
