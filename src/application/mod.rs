//! Application layer: the orchestrator and its background loops.

pub mod history;
pub mod orchestrator;

pub use history::HistoryPersister;
pub use orchestrator::{BackgroundTasks, CycleReport, Orchestrator, ResilientOutcome};
