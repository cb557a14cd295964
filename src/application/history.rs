//! Periodic persistence of escalation history.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::orchestrator::Orchestrator;
use crate::domain::ports::HistoryStore;

/// Saves the orchestrator's escalation history to a store on a fixed
/// interval, and once more when the orchestrator shuts down.
pub struct HistoryPersister {
    orchestrator: Orchestrator,
    store: Arc<dyn HistoryStore>,
}

impl HistoryPersister {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Load saved history into the orchestrator.
    ///
    /// Returns `false` when nothing had been saved yet.
    pub async fn restore(&self) -> Result<bool> {
        let Some(state) = self
            .store
            .load()
            .await
            .context("Failed to load escalation history")?
        else {
            return Ok(false);
        };

        let metrics = state.records.len();
        self.orchestrator.restore_history(state).await;
        info!(metrics, "Escalation history restored");
        Ok(true)
    }

    pub async fn persist_once(&self) -> Result<()> {
        let state = self.orchestrator.export_history().await;
        self.store
            .save(&state)
            .await
            .context("Failed to save escalation history")
    }

    /// Save every `every` until the orchestrator shuts down. Failed saves are
    /// logged and retried on the next tick.
    pub fn start(self, every: Duration) -> JoinHandle<Result<()>> {
        let mut shutdown_rx = self.orchestrator.subscribe_shutdown();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; nothing has changed yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.persist_once().await {
                            error!(error = ?e, "Periodic history save failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            self.persist_once().await?;
            info!("History persister stopped");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::JsonFileHistoryStore;
    use crate::domain::models::{Config, EscalationRecord, EscalationState};
    use chrono::Utc;
    use tempfile::TempDir;

    fn state_with_breach() -> EscalationState {
        let mut state = EscalationState::default();
        state.records.insert(
            "system_load".to_string(),
            vec![EscalationRecord::breach("system_load", 0.95, 0.85, Utc::now())],
        );
        state.adjustments.insert("system_load".to_string(), 1.3);
        state
    }

    #[tokio::test]
    async fn test_restore_from_empty_store() {
        let dir = TempDir::new().unwrap();
        let persister = HistoryPersister::new(
            Orchestrator::new(Config::default()),
            Arc::new(JsonFileHistoryStore::new(dir.path().join("history.json"))),
        );
        assert!(!persister.restore().await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_and_restore() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileHistoryStore::new(dir.path().join("history.json")));

        let source = Orchestrator::new(Config::default());
        source.restore_history(state_with_breach()).await;
        HistoryPersister::new(source, store.clone())
            .persist_once()
            .await
            .unwrap();

        let target = Orchestrator::new(Config::default());
        let persister = HistoryPersister::new(target.clone(), store);
        assert!(persister.restore().await.unwrap());

        let restored = target.export_history().await;
        assert_eq!(restored.records["system_load"].len(), 1);
        assert!((restored.adjustments["system_load"] - 1.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_final_save_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let orchestrator = Orchestrator::new(Config::default());
        orchestrator.restore_history(state_with_breach()).await;

        let handle = HistoryPersister::new(
            orchestrator.clone(),
            Arc::new(JsonFileHistoryStore::new(&path)),
        )
        .start(Duration::from_secs(3600));
        tokio::task::yield_now().await;
        orchestrator.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(path.exists());
    }
}
