pub mod capability;
pub mod config;
pub mod escalation;
pub mod fallback;
pub mod metrics;
pub mod strategy;
pub mod task;

pub use capability::{CapabilityConfig, CapabilityStats, CapabilityStatus};
pub use config::{
    Config, DispatcherConfig, EscalationConfig, FallbackConfig, LoggingConfig, MonitoringConfig,
    PlannerConfig, RetryConfig,
};
pub use escalation::{EscalationRecord, EscalationState, Notification, NotificationKind, Urgency};
pub use fallback::{FallbackHistory, FallbackOutcome};
pub use metrics::{MetricsSnapshot, OptimizationImpact};
pub use strategy::{Plan, PlanningContext, StepReport, StrategyReport};
pub use task::{CacheKey, Task};
