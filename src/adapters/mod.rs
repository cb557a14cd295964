//! Adapters implementing the domain ports.

pub mod history_store;
pub mod sinks;
pub mod strategies;
pub mod system_metrics;

pub use history_store::JsonFileHistoryStore;
pub use sinks::{ChannelSink, TracingSink};
pub use strategies::{StaticFallback, TunableStrategy};
pub use system_metrics::{ProcessMemorySampler, SystemMetricsSource};
