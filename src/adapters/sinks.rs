//! Notification sinks.

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::domain::models::{Notification, Urgency};
use crate::domain::ports::NotificationSink;

/// Fans notifications out to any number of broadcast subscribers.
///
/// Slow subscribers lag and miss notifications rather than blocking the
/// monitor.
#[derive(Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, notification: &Notification) {
        // No subscribers is not an error.
        let _ = self.tx.send(notification.clone());
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, notification: &Notification) {
        match notification.urgency {
            Urgency::Low => info!(
                id = %notification.id,
                urgency = notification.urgency.as_str(),
                "{}", notification.message
            ),
            Urgency::Medium | Urgency::High => warn!(
                id = %notification.id,
                urgency = notification.urgency.as_str(),
                suggested_actions = ?notification.suggested_actions,
                "{}", notification.message
            ),
        }
    }
}
