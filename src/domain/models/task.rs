//! Dispatch requests and their cache keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Deterministic cache key for a `(capability, parameters)` pair.
///
/// The digest covers the capability name and the canonical JSON encoding of
/// the parameters (object keys sorted), so logically equal parameter
/// payloads share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub capability: String,
    pub digest: String,
}

impl CacheKey {
    /// Derive the key for a capability invocation.
    pub fn derive(capability: &str, parameters: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(capability.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(parameters).as_bytes());

        Self {
            capability: capability.to_string(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.capability, &self.digest[..12.min(self.digest.len())])
    }
}

/// JSON encoding with object keys in sorted order at every depth.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// A unit of work addressed to a named capability.
///
/// Consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub capability: String,
    pub parameters: Value,
    /// Present only for cache-eligible capabilities
    pub cache_key: Option<CacheKey>,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    /// Create a task; the cache key is derived only when `cacheable`.
    pub fn new(capability: impl Into<String>, parameters: Value, cacheable: bool) -> Self {
        let capability = capability.into();
        let cache_key = cacheable.then(|| CacheKey::derive(&capability, &parameters));

        Self {
            id: Uuid::new_v4(),
            capability,
            parameters,
            cache_key,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_ignores_key_order() {
        let a = CacheKey::derive(
            "analyze",
            &json!({"path": "src", "depth": 2, "opts": {"x": 1, "y": [1, 2]}}),
        );
        let b = CacheKey::derive(
            "analyze",
            &json!({"opts": {"y": [1, 2], "x": 1}, "depth": 2, "path": "src"}),
        );
        assert_eq!(a, b);
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn test_cache_key_distinguishes_capability_and_params() {
        let params = json!({"path": "src"});
        let a = CacheKey::derive("analyze", &params);
        let b = CacheKey::derive("summarize", &params);
        let c = CacheKey::derive("analyze", &json!({"path": "tests"}));
        assert_ne!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
    }

    #[test]
    fn test_task_cache_key_only_when_cacheable() {
        let cached = Task::new("analyze", json!({}), true);
        let uncached = Task::new("analyze", json!({}), false);
        assert!(cached.cache_key.is_some());
        assert!(uncached.cache_key.is_none());
        assert_ne!(cached.id, uncached.id);
    }
}
