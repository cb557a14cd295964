//! Process memory growth watch.
//!
//! Runs independently of metric evaluation: every interval the current
//! resident memory is compared with the previous sample, and growth above
//! the configured threshold raises a `High` leak notification.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::models::{Notification, NotificationKind, Urgency};
use crate::domain::ports::{MemorySampler, NotificationSink};

struct WatchInner {
    sampler: Arc<dyn MemorySampler>,
    growth_threshold_mb: f64,
    last_sample_mb: Mutex<Option<f64>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Owner's shutdown signal; also stops the loop when set
    linked_shutdown: Option<broadcast::Sender<()>>,
}

/// Watches process memory for sustained growth. Clones share state.
#[derive(Clone)]
pub struct MemoryWatch {
    inner: Arc<WatchInner>,
}

impl MemoryWatch {
    pub fn new(
        sampler: Arc<dyn MemorySampler>,
        growth_threshold_mb: f64,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Self {
        Self::build(sampler, growth_threshold_mb, sinks, None)
    }

    /// A watch whose loop also stops when `owner_shutdown` fires.
    pub fn linked(
        sampler: Arc<dyn MemorySampler>,
        growth_threshold_mb: f64,
        sinks: Vec<Arc<dyn NotificationSink>>,
        owner_shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self::build(sampler, growth_threshold_mb, sinks, Some(owner_shutdown))
    }

    fn build(
        sampler: Arc<dyn MemorySampler>,
        growth_threshold_mb: f64,
        sinks: Vec<Arc<dyn NotificationSink>>,
        linked_shutdown: Option<broadcast::Sender<()>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(WatchInner {
                sampler,
                growth_threshold_mb,
                last_sample_mb: Mutex::new(None),
                sinks,
                shutdown_tx,
                linked_shutdown,
            }),
        }
    }

    /// Take one sample and compare it with the previous one.
    ///
    /// The first sample only establishes the baseline.
    pub async fn check_once(&self) -> Option<Notification> {
        let Some(current) = self.inner.sampler.resident_mb().await else {
            debug!("Memory sampler returned no sample");
            return None;
        };

        let previous = self.inner.last_sample_mb.lock().await.replace(current)?;
        let growth = current - previous;
        if growth <= self.inner.growth_threshold_mb {
            return None;
        }

        warn!(
            previous_mb = previous,
            current_mb = current,
            growth_mb = growth,
            "Possible memory leak"
        );
        let notification = Notification::new(
            NotificationKind::MemoryLeak,
            Urgency::High,
            format!(
                "Process memory grew by {growth:.1} MB in one interval ({previous:.1} MB -> {current:.1} MB)"
            ),
            Utc::now(),
        )
        .with_context(json!({
            "previous_mb": previous,
            "current_mb": current,
            "growth_mb": growth,
            "threshold_mb": self.inner.growth_threshold_mb,
        }))
        .with_suggested_actions(vec![
            "Capture a heap profile of the process".to_string(),
            "Clear result caches and watch whether memory is released".to_string(),
        ]);

        for sink in &self.inner.sinks {
            sink.deliver(&notification);
        }
        Some(notification)
    }

    /// Run `check_once` every `every` until [`MemoryWatch::shutdown`], or
    /// until the owner's shutdown for a linked watch.
    pub fn start(&self, every: Duration) -> JoinHandle<Result<()>> {
        let watch = self.clone();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let mut owner_rx = self
            .inner
            .linked_shutdown
            .as_ref()
            .map(broadcast::Sender::subscribe);

        tokio::spawn(async move {
            let mut ticker = interval(every);
            info!(interval_secs = every.as_secs(), "Memory watch started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        watch.check_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                    () = owner_signal(owner_rx.as_mut()) => {
                        break;
                    }
                }
            }

            info!("Memory watch stopped");
            Ok(())
        })
    }

    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(());
    }
}

/// Resolves when the owner signals shutdown; never for an unlinked watch.
async fn owner_signal(rx: Option<&mut broadcast::Receiver<()>>) {
    match rx {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending().await,
    }
}
