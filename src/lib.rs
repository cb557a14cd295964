//! Conductor - adaptive task orchestration and resilience core
//!
//! Conductor dispatches work to named capability handlers under a global
//! concurrency ceiling, caches results, picks runtime optimization strategies
//! by estimated benefit per cost, recovers through ranked fallback chains and
//! escalates unresolved problems with self-adjusting thresholds.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): dispatcher, planner, fallback and escalation engines
//! - **Application Layer** (`application`): the orchestrator and its background loops
//! - **Adapters** (`adapters`): sinks, history store, metrics source, data-driven strategies
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use conductor::application::Orchestrator;
//! use conductor::domain::models::Config;
//! use conductor::domain::ports::FnCapability;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(Config::default());
//! let echo = FnCapability::new(|params| async move { Ok(json!({ "echo": params })) });
//! orchestrator.register_capability("echo", Arc::new(echo), None).await;
//!
//! let result = orchestrator.submit("echo", json!({"n": 1})).await?;
//! assert_eq!(result["echo"]["n"], 1);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{
    BackgroundTasks, CycleReport, HistoryPersister, Orchestrator, ResilientOutcome,
};
pub use domain::errors::{CapabilityError, DispatchError, DispatchResult, StrategyError};
pub use domain::models::{
    CapabilityConfig, CapabilityStats, Config, FallbackOutcome, MetricsSnapshot, Notification,
    Plan, Urgency,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EscalationMonitor, FallbackController, StrategyPlanner, TaskDispatcher};
