//! Named capability handlers with their configuration and statistics.
//!
//! The registry is plain data; the dispatcher owns it inside its critical
//! section, so every mutation happens under the dispatcher lock.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::{CapabilityConfig, CapabilityStats};
use crate::domain::ports::Capability;

/// A registered capability.
pub struct CapabilityEntry {
    pub handler: Arc<dyn Capability>,
    pub config: CapabilityConfig,
    pub stats: CapabilityStats,
}

/// Mapping from capability name to its entry.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a capability.
    ///
    /// Replacement resets statistics but keeps the live in-flight count, so
    /// executions already running still finish against an exact busy status.
    /// Returns `true` when an existing entry was replaced.
    pub fn register(
        &mut self,
        name: &str,
        handler: Arc<dyn Capability>,
        config: CapabilityConfig,
    ) -> bool {
        let mut stats = CapabilityStats::new(name);

        let replaced = if let Some(previous) = self.entries.get(name) {
            warn!(capability = %name, "Capability re-registered, replacing handler");
            for _ in 0..previous.stats.in_flight {
                stats.begin();
            }
            true
        } else {
            info!(
                capability = %name,
                timeout_ms = config.timeout_ms,
                cache_eligible = config.cache_eligible,
                "Capability registered"
            );
            false
        };

        self.entries.insert(
            name.to_string(),
            CapabilityEntry {
                handler,
                config,
                stats,
            },
        );
        replaced
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CapabilityEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics of every capability, sorted by name.
    pub fn stats(&self) -> Vec<CapabilityStats> {
        let mut stats: Vec<CapabilityStats> =
            self.entries.values().map(|e| e.stats.clone()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CapabilityStatus;
    use crate::domain::ports::FnCapability;
    use chrono::Utc;
    use serde_json::json;

    fn echo() -> Arc<dyn Capability> {
        Arc::new(FnCapability::new(|params| async move { Ok(params) }))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        assert!(!registry.register("echo", echo(), CapabilityConfig::default()));
        assert!(registry.contains("echo"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.stats()[0].name, "echo");
    }

    #[test]
    fn test_reregistration_keeps_in_flight() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", echo(), CapabilityConfig::default());
        {
            let entry = registry.get_mut("echo").unwrap();
            entry.stats.begin();
            entry.stats.finish(10.0, true, Utc::now());
            entry.stats.begin();
        }

        assert!(registry.register("echo", echo(), CapabilityConfig::default().with_max_retries(7)));
        let entry = registry.get("echo").unwrap();
        assert_eq!(entry.config.max_retries, 7);
        assert_eq!(entry.stats.success_count, 0);
        assert_eq!(entry.stats.in_flight, 1);
        assert_eq!(entry.stats.status, CapabilityStatus::Busy);
    }

    #[tokio::test]
    async fn test_handler_is_callable() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", echo(), CapabilityConfig::default());
        let handler = Arc::clone(&registry.get("echo").unwrap().handler);
        let out = handler.execute(json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }
}
