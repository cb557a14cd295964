//! Port trait definitions (Hexagonal Architecture)
//!
//! The seams where external collaborators plug into the core:
//! - Capability: executable work registered with the dispatcher
//! - OptimizationStrategy / FallbackStrategy: planner and fallback candidates
//! - MetricsSource / MemorySampler: pulled observations
//! - NotificationSink: pushed escalation notifications
//! - HistoryStore: escalation history persistence

pub mod capability;
pub mod monitoring;
pub mod strategy;

pub use capability::{Capability, FnCapability};
pub use monitoring::{HistoryStore, MemorySampler, MetricsSource, NotificationSink};
pub use strategy::{FallbackStrategy, OptimizationStrategy};
