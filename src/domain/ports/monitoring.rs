use anyhow::Result;
use async_trait::async_trait;

use crate::domain::errors::HistoryStoreError;
use crate::domain::models::{EscalationState, MetricsSnapshot, Notification};

/// Pull-based provider of metrics snapshots.
///
/// The core polls it at a caller-defined cadence.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn snapshot(&self) -> Result<MetricsSnapshot>;
}

/// Receives notifications raised by the escalation monitor.
///
/// Delivery must not block; sinks that do I/O should hand the notification
/// off to a channel.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Persistence of escalation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the last saved state, `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<EscalationState>, HistoryStoreError>;

    async fn save(&self, state: &EscalationState) -> Result<(), HistoryStoreError>;
}

/// Reads the memory footprint of the current process.
#[async_trait]
pub trait MemorySampler: Send + Sync {
    /// Resident memory in megabytes, `None` when unavailable
    async fn resident_mb(&self) -> Option<f64>;
}
