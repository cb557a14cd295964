//! Domain layer for the conductor orchestration core
//!
//! Models, error types and the port traits implemented by adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    CapabilityError, DispatchError, DispatchResult, HistoryStoreError, StrategyError,
};
