//! TTL cache of successful capability results.
//!
//! Backed by a moka future cache with a per-entry expiry policy. Entries also
//! carry their own `stored_at`/`ttl` so a read past the TTL is reported as a
//! miss even if moka has not evicted the entry yet.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::domain::models::CacheKey;

/// A cached capability result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry is past its TTL at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.stored_at).to_std().unwrap_or(Duration::ZERO);
        age >= self.ttl
    }
}

/// Expiry policy honouring each entry's own TTL.
struct EntryTtl;

impl Expiry<CacheKey, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Result cache shared by the dispatcher.
#[derive(Clone)]
pub struct ResultCache {
    entries: Cache<CacheKey, CacheEntry>,
}

impl ResultCache {
    /// Create a cache holding at most `max_capacity` results.
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryTtl)
            .support_invalidation_closures()
            .build();

        Self { entries }
    }

    /// Look up a fresh result. Stale entries are evicted and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let entry = self.entries.get(key).await?;
        if entry.is_stale(Utc::now()) {
            debug!(key = %key, "Evicting stale cache entry");
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry.value)
    }

    /// Store a result, replacing any previous entry under the same key.
    pub async fn insert(&self, key: CacheKey, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Utc::now(),
            ttl,
        };
        self.entries.insert(key, entry).await;
    }

    /// Invalidate cached results of one capability, or everything for `None`.
    pub async fn clear(&self, capability: Option<&str>) {
        match capability {
            Some(name) => {
                let name = name.to_string();
                if let Err(e) = self
                    .entries
                    .invalidate_entries_if(move |key, _| key.capability == name)
                {
                    warn!(error = %e, "Selective invalidation unavailable, clearing whole cache");
                    self.entries.invalidate_all();
                }
            }
            None => self.entries.invalidate_all(),
        }
        self.entries.run_pending_tasks().await;
    }

    /// Approximate number of live entries.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
