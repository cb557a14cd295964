//! Strategy planner.
//!
//! Selects a bounded, mutually compatible set of optimization strategies
//! maximising estimated benefit per unit cost.
//!
//! - **compatibility**: symmetric matrix of forbidden strategy pairs
//! - **models**: pluggable cost and benefit models
//!
//! The search is a bounded dynamic program over combination size. `dp[i]`
//! holds the highest-benefit combination of exactly `i` strategies, its
//! cumulative cost, and the metrics projected after applying its members in
//! order. `dp[i]` extends `dp[i - 1]` by one admissible strategy, evaluated
//! against the projected (not the original) metrics. The final plan is the
//! combination with the best benefit/cost ratio among every extension
//! evaluated on the way, so a cheap strategy that never holds a `dp` slot can
//! still be chosen.

pub mod compatibility;
pub mod models;

pub use compatibility::CompatibilityMatrix;
pub use models::{
    AdaptiveCostModel, ApplicabilityBenefitModel, BenefitModel, CostModel, LinearLoadCostModel,
};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::errors::StrategyError;
use crate::domain::models::strategy::efficiency;
use crate::domain::models::{MetricsSnapshot, Plan, PlannerConfig, PlanningContext, StepReport};
use crate::domain::ports::OptimizationStrategy;

/// One DP state: a combination and what it is expected to cost and yield.
#[derive(Debug, Clone)]
struct Combination {
    members: Vec<usize>,
    step_costs: Vec<f64>,
    benefit: f64,
    cost: f64,
    projected: MetricsSnapshot,
}

impl Combination {
    fn efficiency(&self) -> f64 {
        efficiency(self.benefit, self.cost)
    }

    fn empty(metrics: MetricsSnapshot) -> Self {
        Self {
            members: Vec::new(),
            step_costs: Vec::new(),
            benefit: 0.0,
            cost: 0.0,
            projected: metrics,
        }
    }
}

/// Result of one search: the `dp` winners per size and every combination
/// evaluated along the way, both in size order.
struct Exploration {
    winners: Vec<Combination>,
    candidates: Vec<Combination>,
}

pub struct StrategyPlanner {
    strategies: Vec<Arc<dyn OptimizationStrategy>>,
    compatibility: CompatibilityMatrix,
    cost_model: Box<dyn CostModel>,
    benefit_model: Box<dyn BenefitModel>,
}

impl StrategyPlanner {
    pub fn new(cost_model: Box<dyn CostModel>, benefit_model: Box<dyn BenefitModel>) -> Self {
        Self {
            strategies: Vec::new(),
            compatibility: CompatibilityMatrix::new(),
            cost_model,
            benefit_model,
        }
    }

    /// Planner with the default linear models, wrapped in the adaptive cost
    /// correction when enabled.
    pub fn from_config(config: &PlannerConfig) -> Self {
        let linear = Box::new(LinearLoadCostModel::new(config.load_cost_weight));
        let cost_model: Box<dyn CostModel> = if config.adaptive_costs {
            Box::new(AdaptiveCostModel::new(linear, config.learning_rate))
        } else {
            linear
        };
        Self::new(cost_model, Box::new(ApplicabilityBenefitModel))
    }

    /// Register a strategy, replacing any strategy with the same name.
    pub fn register(&mut self, strategy: Arc<dyn OptimizationStrategy>) {
        if let Some(existing) = self
            .strategies
            .iter_mut()
            .find(|s| s.name() == strategy.name())
        {
            warn!(strategy = %strategy.name(), "Strategy re-registered, replacing");
            *existing = strategy;
        } else {
            debug!(strategy = %strategy.name(), "Strategy registered");
            self.strategies.push(strategy);
        }
    }

    /// Declare two strategies as never selectable together.
    pub fn forbid_pair(&mut self, a: &str, b: &str) {
        self.compatibility.forbid(a, b);
    }

    pub const fn compatibility(&self) -> &CompatibilityMatrix {
        &self.compatibility
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn OptimizationStrategy>> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Select the most efficient feasible combination of at most
    /// `max_strategies` strategies.
    ///
    /// Returns an empty plan when no non-empty combination is feasible.
    pub fn plan(
        &self,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
        max_strategies: usize,
    ) -> Plan {
        let mut best: Option<Combination> = None;
        for candidate in self.explore(metrics, context, max_strategies).candidates {
            // Strictly greater keeps the smaller combination on ties.
            if best
                .as_ref()
                .is_none_or(|b| candidate.efficiency() > b.efficiency())
            {
                best = Some(candidate);
            }
        }

        match best {
            Some(combination) => {
                let plan = self.to_plan(combination);
                info!(
                    strategies = ?plan.strategies,
                    benefit = plan.estimated_benefit,
                    cost = plan.estimated_cost,
                    efficiency = plan.efficiency(),
                    "Plan selected"
                );
                plan
            }
            None => {
                debug!("No feasible strategy combination");
                Plan::empty()
            }
        }
    }

    /// The highest-benefit combination for each size `1..=max_strategies`,
    /// in size order. Stops at the first size with no admissible extension.
    pub fn search(
        &self,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
        max_strategies: usize,
    ) -> Vec<Plan> {
        self.explore(metrics, context, max_strategies)
            .winners
            .into_iter()
            .map(|c| self.to_plan(c))
            .collect()
    }

    fn explore(
        &self,
        metrics: &MetricsSnapshot,
        context: &PlanningContext,
        max_strategies: usize,
    ) -> Exploration {
        let limit = max_strategies.min(self.strategies.len());
        let mut dp: Vec<Combination> = Vec::with_capacity(limit + 1);
        dp.push(Combination::empty(*metrics));
        let mut candidates: Vec<Combination> = Vec::new();

        for size in 1..=limit {
            let previous = &dp[size - 1];
            let mut best: Option<usize> = None;

            for (index, strategy) in self.strategies.iter().enumerate() {
                if !self.admissible(index, previous) {
                    continue;
                }

                let state = &previous.projected;
                let applicability = strategy.evaluate(state);
                if applicability.is_nan() || applicability <= 0.0 {
                    continue;
                }

                let cost = self.cost_model.cost(strategy.as_ref(), state, context);
                let benefit = self.benefit_model.benefit(strategy.as_ref(), state, context);
                if !cost.is_finite() || cost < 0.0 || !benefit.is_finite() || benefit <= 0.0 {
                    continue;
                }

                let total_cost = previous.cost + cost;
                if context.cost_budget.is_some_and(|budget| total_cost > budget) {
                    continue;
                }

                let mut extended = previous.clone();
                extended.members.push(index);
                extended.step_costs.push(cost);
                extended.benefit = previous.benefit + benefit;
                extended.cost = total_cost;
                extended.projected = strategy.simulate(state);

                if best.is_none_or(|b| extended.benefit > candidates[b].benefit) {
                    best = Some(candidates.len());
                }
                candidates.push(extended);
            }

            match best {
                Some(winner) => {
                    let combination = candidates[winner].clone();
                    debug!(
                        size,
                        benefit = combination.benefit,
                        cost = combination.cost,
                        "Extended combination"
                    );
                    dp.push(combination);
                }
                None => break,
            }
        }

        dp.remove(0);
        Exploration {
            winners: dp,
            candidates,
        }
    }

    /// Whether strategy `index` may join `combination`.
    fn admissible(&self, index: usize, combination: &Combination) -> bool {
        if combination.members.contains(&index) {
            return false;
        }
        let candidate = &self.strategies[index];
        let name = candidate.name();

        let members: Vec<&Arc<dyn OptimizationStrategy>> = combination
            .members
            .iter()
            .map(|&m| &self.strategies[m])
            .collect();

        let compatible = members.iter().all(|m| {
            self.compatibility.is_compatible(name, m.name())
                && !candidate.conflicts().iter().any(|c| c == m.name())
                && !m.conflicts().iter().any(|c| c == name)
        });
        let dependencies_met = candidate
            .dependencies()
            .iter()
            .all(|dep| members.iter().any(|m| m.name() == dep));

        compatible && dependencies_met
    }

    fn to_plan(&self, combination: Combination) -> Plan {
        Plan {
            strategies: combination
                .members
                .iter()
                .map(|&i| self.strategies[i].name().to_string())
                .collect(),
            estimated_benefit: combination.benefit,
            estimated_cost: combination.cost,
            step_costs: combination.step_costs,
            projected_metrics: Some(combination.projected),
        }
    }

    /// Execute the strategies of a plan in order.
    ///
    /// Each reported actual cost is fed back into the cost model. A failing
    /// step is logged and recorded; the remaining steps still run.
    pub async fn execute_plan(&mut self, plan: &Plan, parameters: &Value) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(plan.len());

        for (position, name) in plan.strategies.iter().enumerate() {
            let expected_cost = plan.step_costs.get(position).copied().unwrap_or(0.0);

            let outcome = match self.get(name).cloned() {
                Some(strategy) => strategy.execute(parameters).await,
                None => Err(StrategyError::UnknownStrategy {
                    strategy: name.clone(),
                }),
            };

            let report = match outcome {
                Ok(report) => {
                    if let Some(actual) = report.actual_cost {
                        self.cost_model.observe(name, expected_cost, actual);
                    }
                    StepReport {
                        strategy: name.clone(),
                        expected_cost,
                        actual_cost: report.actual_cost,
                        output: Some(report.output),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(strategy = %name, error = %e, "Strategy execution failed");
                    StepReport {
                        strategy: name.clone(),
                        expected_cost,
                        actual_cost: None,
                        output: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        reports
    }
}
