//! Property tests for the strategy planner.

use conductor::adapters::TunableStrategy;
use conductor::domain::models::{MetricsSnapshot, PlannerConfig, PlanningContext};
use conductor::StrategyPlanner;
use proptest::prelude::*;
use std::sync::Arc;

fn planner(figures: &[(f64, f64)], forbidden: &[(usize, usize)]) -> StrategyPlanner {
    let mut planner = StrategyPlanner::from_config(&PlannerConfig::default());
    for (i, (cost, benefit)) in figures.iter().enumerate() {
        planner.register(Arc::new(TunableStrategy::new(format!("s{i}"), *cost, *benefit)));
    }
    for (a, b) in forbidden {
        let (a, b) = (a % figures.len(), b % figures.len());
        if a != b {
            planner.forbid_pair(&format!("s{a}"), &format!("s{b}"));
        }
    }
    planner
}

fn figures() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.1f64..10.0, 0.0f64..10.0), 1..8)
}

proptest! {
    /// Property: a plan never exceeds the requested size
    #[test]
    fn prop_plan_size_bounded(
        figures in figures(),
        max in 1usize..5,
        load in 0.0f64..2.0,
    ) {
        let planner = planner(&figures, &[]);
        let metrics = MetricsSnapshot { system_load: load, ..Default::default() };
        let plan = planner.plan(&metrics, &PlanningContext::default(), max);
        prop_assert!(plan.len() <= max);
        prop_assert_eq!(plan.step_costs.len(), plan.len());
    }

    /// Property: forbidden pairs never appear together
    #[test]
    fn prop_compatibility_respected(
        figures in figures(),
        forbidden in prop::collection::vec((0usize..8, 0usize..8), 0..10),
        max in 1usize..5,
    ) {
        let planner = planner(&figures, &forbidden);
        let ctx = PlanningContext::default();
        let metrics = MetricsSnapshot::default();

        let mut plans = planner.search(&metrics, &ctx, max);
        plans.push(planner.plan(&metrics, &ctx, max));

        for plan in &plans {
            for (i, a) in plan.strategies.iter().enumerate() {
                for b in &plan.strategies[i + 1..] {
                    prop_assert!(a != b, "duplicate strategy {}", a);
                    prop_assert!(planner.compatibility().is_compatible(a, b));
                }
            }
        }
    }

    /// Property: the chosen plan is at least as efficient as every per-size winner
    #[test]
    fn prop_plan_is_most_efficient(
        figures in figures(),
        max in 1usize..5,
    ) {
        let planner = planner(&figures, &[]);
        let ctx = PlanningContext::default();
        let metrics = MetricsSnapshot::default();

        let plan = planner.plan(&metrics, &ctx, max);
        for winner in planner.search(&metrics, &ctx, max) {
            prop_assert!(plan.efficiency() >= winner.efficiency() - 1e-9);
        }
    }

    /// Property: the cost budget bounds every plan
    #[test]
    fn prop_budget_respected(
        figures in figures(),
        budget in 0.0f64..15.0,
        max in 1usize..5,
    ) {
        let planner = planner(&figures, &[]);
        let ctx = PlanningContext::default().with_budget(budget);
        let plan = planner.plan(&MetricsSnapshot::default(), &ctx, max);
        prop_assert!(plan.estimated_cost <= budget + 1e-9);
    }
}
