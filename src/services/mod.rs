//! Service layer: the dispatch, planning, fallback and escalation engines.

pub mod capability_registry;
pub mod escalation_monitor;
pub mod fallback_controller;
pub mod memory_watch;
pub mod result_cache;
pub mod retry;
pub mod strategy_planner;
pub mod task_dispatcher;

pub use capability_registry::{CapabilityEntry, CapabilityRegistry};
pub use escalation_monitor::EscalationMonitor;
pub use fallback_controller::FallbackController;
pub use memory_watch::MemoryWatch;
pub use result_cache::{CacheEntry, ResultCache};
pub use retry::RetryPolicy;
pub use strategy_planner::{
    AdaptiveCostModel, ApplicabilityBenefitModel, BenefitModel, CompatibilityMatrix, CostModel,
    LinearLoadCostModel, StrategyPlanner,
};
pub use task_dispatcher::{DispatcherStats, TaskDispatcher};
