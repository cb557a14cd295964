//! Bounded-concurrency task dispatcher.
//!
//! All bookkeeping (slot accounting, the pending queue, capability
//! statistics, cache writes) happens inside one critical section guarded by
//! a single `tokio::sync::Mutex`. Executions themselves run as separate tokio
//! tasks outside the lock.
//!
//! A slot is owned by a driver task: when an execution finishes the driver
//! takes the next pending job itself, so a freed slot is handed over without
//! releasing it and queued jobs are served strictly FIFO.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::capability_registry::CapabilityRegistry;
use super::result_cache::ResultCache;
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::models::{CapabilityConfig, CapabilityStats, DispatcherConfig, Task};
use crate::domain::ports::Capability;

/// Snapshot of the dispatcher for the administrative surface.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub max_concurrency: usize,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub cache_entries: u64,
    pub capabilities: Vec<CapabilityStats>,
}

impl DispatcherStats {
    /// Failed attempts over all attempts of every capability.
    pub fn error_rate(&self) -> f64 {
        let (errors, attempts) = self
            .capabilities
            .iter()
            .fold((0u64, 0u64), |(e, a), s| (e + s.error_count, a + s.attempts()));
        if attempts == 0 {
            0.0
        } else {
            errors as f64 / attempts as f64
        }
    }

    /// Mean of the per-capability average execution times of capabilities
    /// that have run at least once.
    pub fn mean_execution_time_ms(&self) -> f64 {
        let ran: Vec<f64> = self
            .capabilities
            .iter()
            .filter(|s| s.attempts() > 0)
            .map(|s| s.avg_execution_time_ms)
            .collect();
        if ran.is_empty() {
            0.0
        } else {
            ran.iter().sum::<f64>() / ran.len() as f64
        }
    }
}

/// A task waiting for, or holding, a concurrency slot.
struct Job {
    task: Task,
    handler: Arc<dyn Capability>,
    config: CapabilityConfig,
    responder: oneshot::Sender<DispatchResult<Value>>,
}

struct DispatcherState {
    registry: CapabilityRegistry,
    in_flight: usize,
    pending: VecDeque<Job>,
}

struct DispatcherInner {
    state: Mutex<DispatcherState>,
    cache: ResultCache,
    max_concurrency: usize,
    defaults: DispatcherConfig,
}

/// Dispatches tasks to registered capabilities under a global concurrency
/// ceiling. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                state: Mutex::new(DispatcherState {
                    registry: CapabilityRegistry::new(),
                    in_flight: 0,
                    pending: VecDeque::new(),
                }),
                cache: ResultCache::new(config.cache_max_capacity),
                max_concurrency: config.max_concurrency.max(1),
                defaults: config.clone(),
            }),
        }
    }

    /// Capability configuration built from the dispatcher defaults.
    pub fn default_capability_config(&self) -> CapabilityConfig {
        CapabilityConfig::from_defaults(&self.inner.defaults)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Register a capability, replacing any previous one with the same name.
    ///
    /// Returns `true` when an existing registration was replaced.
    pub async fn register(
        &self,
        name: &str,
        handler: Arc<dyn Capability>,
        config: CapabilityConfig,
    ) -> bool {
        let mut state = self.inner.state.lock().await;
        state.registry.register(name, handler, config)
    }

    /// Submit a task and wait for its result.
    ///
    /// A fresh cache hit returns immediately without taking a slot. Otherwise
    /// the task starts at once when a slot is free, or waits in the FIFO
    /// queue until one is handed over.
    ///
    /// # Errors
    ///
    /// `CapabilityNotFound` for an unregistered name, `ExecutionTimeout` when
    /// the capability's deadline passes, `ExecutionError` when the handler
    /// fails.
    pub async fn submit(&self, capability: &str, parameters: Value) -> DispatchResult<Value> {
        let (responder, receiver) = oneshot::channel();

        {
            let mut state = self.inner.state.lock().await;

            let (handler, config) = match state.registry.get(capability) {
                Some(entry) => (Arc::clone(&entry.handler), entry.config.clone()),
                None => {
                    return Err(DispatchError::CapabilityNotFound {
                        name: capability.to_string(),
                    });
                }
            };

            let task = Task::new(capability, parameters, config.cache_eligible);
            if let Some(key) = &task.cache_key {
                if let Some(value) = self.inner.cache.get(key).await {
                    debug!(capability = %capability, key = %key, "Cache hit");
                    return Ok(value);
                }
            }

            let job = Job {
                task,
                handler,
                config,
                responder,
            };

            if state.in_flight < self.inner.max_concurrency {
                state.in_flight += 1;
                if let Some(entry) = state.registry.get_mut(capability) {
                    entry.stats.begin();
                }
                tokio::spawn(drive_slot(Arc::clone(&self.inner), job));
            } else {
                state.pending.push_back(job);
                debug!(
                    capability = %capability,
                    queue_depth = state.pending.len(),
                    "All slots busy, task queued"
                );
            }
        }

        receiver.await.unwrap_or_else(|_| {
            Err(DispatchError::ExecutionError {
                capability: capability.to_string(),
                message: "task was dropped before completion".to_string(),
            })
        })
    }

    /// Statistics of every registered capability, sorted by name.
    pub async fn stats(&self) -> Vec<CapabilityStats> {
        self.inner.state.lock().await.registry.stats()
    }

    /// Statistics of a single capability.
    pub async fn capability_stats(&self, name: &str) -> Option<CapabilityStats> {
        let state = self.inner.state.lock().await;
        state.registry.get(name).map(|entry| entry.stats.clone())
    }

    /// Configuration a capability was registered with.
    pub async fn capability_config(&self, name: &str) -> Option<CapabilityConfig> {
        let state = self.inner.state.lock().await;
        state.registry.get(name).map(|entry| entry.config.clone())
    }

    /// Full dispatcher snapshot.
    pub async fn dispatcher_stats(&self) -> DispatcherStats {
        let (in_flight, queue_depth, capabilities) = {
            let state = self.inner.state.lock().await;
            (state.in_flight, state.pending.len(), state.registry.stats())
        };

        DispatcherStats {
            max_concurrency: self.inner.max_concurrency,
            in_flight,
            queue_depth,
            cache_entries: self.inner.cache.len().await,
            capabilities,
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.in_flight
    }

    pub async fn queue_depth(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Invalidate cached results of one capability, or all of them.
    pub async fn clear_cache(&self, capability: Option<&str>) {
        let _state = self.inner.state.lock().await;
        self.inner.cache.clear(capability).await;
        debug!(capability = ?capability, "Cache cleared");
    }
}

/// Runs jobs on one slot until the pending queue is empty.
async fn drive_slot(inner: Arc<DispatcherInner>, mut job: Job) {
    loop {
        let Job {
            task,
            handler,
            config,
            responder,
        } = job;

        let started = Instant::now();
        let parameters = task.parameters.clone();
        let execution = tokio::spawn(async move { handler.execute(parameters).await });

        // On timeout the join handle is dropped, detaching the execution; its
        // eventual result is discarded.
        let result = match timeout(config.timeout(), execution).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(DispatchError::ExecutionError {
                capability: task.capability.clone(),
                message: e.message,
            }),
            Ok(Err(join_error)) => Err(DispatchError::ExecutionError {
                capability: task.capability.clone(),
                message: format!("handler aborted: {join_error}"),
            }),
            Err(_) => {
                warn!(
                    capability = %task.capability,
                    task_id = %task.id,
                    timeout_ms = config.timeout_ms,
                    "Capability execution timed out"
                );
                Err(DispatchError::ExecutionTimeout {
                    capability: task.capability.clone(),
                    timeout_ms: config.timeout_ms,
                })
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let next = {
            let mut state = inner.state.lock().await;

            if let Some(entry) = state.registry.get_mut(&task.capability) {
                entry.stats.finish(elapsed_ms, result.is_ok(), Utc::now());
            }
            if let (Ok(value), Some(key)) = (&result, &task.cache_key) {
                inner
                    .cache
                    .insert(key.clone(), value.clone(), config.cache_ttl())
                    .await;
            }

            debug!(
                capability = %task.capability,
                task_id = %task.id,
                elapsed_ms,
                success = result.is_ok(),
                "Execution finished"
            );

            next_job(&inner, &mut state).await
        };

        // The caller may have gone away; its result is simply dropped.
        let _ = responder.send(result);

        match next {
            Some(queued) => job = queued,
            None => break,
        }
    }
}

/// Pop the next runnable job, keeping the current slot.
///
/// Queued jobs whose result became cached while they waited are answered
/// directly. Releases the slot when nothing runnable is left.
async fn next_job(inner: &DispatcherInner, state: &mut DispatcherState) -> Option<Job> {
    while let Some(job) = state.pending.pop_front() {
        if let Some(key) = &job.task.cache_key {
            if let Some(value) = inner.cache.get(key).await {
                debug!(capability = %job.task.capability, key = %key, "Cache hit for queued task");
                let _ = job.responder.send(Ok(value));
                continue;
            }
        }
        if job.responder.is_closed() {
            debug!(task_id = %job.task.id, "Caller gone, skipping queued task");
            continue;
        }

        if let Some(entry) = state.registry.get_mut(&job.task.capability) {
            entry.stats.begin();
        }
        return Some(job);
    }

    state.in_flight = state.in_flight.saturating_sub(1);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::CapabilityError;
    use crate::domain::models::CapabilityStatus;
    use crate::domain::ports::FnCapability;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dispatcher(max_concurrency: usize) -> TaskDispatcher {
        TaskDispatcher::new(&DispatcherConfig {
            max_concurrency,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let dispatcher = dispatcher(2);
        let err = dispatcher.submit("ghost", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::CapabilityNotFound {
                name: "ghost".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_success_and_error_update_stats() {
        let dispatcher = dispatcher(2);
        let handler = FnCapability::new(|params: Value| async move {
            if params["fail"].as_bool().unwrap_or(false) {
                Err(CapabilityError::new("requested failure"))
            } else {
                Ok(json!({"ok": true}))
            }
        });
        dispatcher
            .register("flaky", Arc::new(handler), CapabilityConfig::default())
            .await;

        assert_eq!(
            dispatcher.submit("flaky", json!({})).await.unwrap(),
            json!({"ok": true})
        );
        let err = dispatcher
            .submit("flaky", json!({"fail": true}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ExecutionError { ref message, .. } if message == "requested failure"
        ));

        let stats = dispatcher.capability_stats("flaky").await.unwrap();
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.status, CapabilityStatus::Idle);
        assert!(stats.last_run_at.is_some());
        assert_eq!(dispatcher.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_handler() {
        let dispatcher = dispatcher(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = FnCapability::new(move |params: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(params)
            }
        });
        dispatcher
            .register(
                "cached",
                Arc::new(handler),
                CapabilityConfig::default().cached(Duration::from_secs(60)),
            )
            .await;

        let first = dispatcher.submit("cached", json!({"a": 1, "b": 2})).await.unwrap();
        let second = dispatcher.submit("cached", json!({"b": 2, "a": 1})).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dispatcher.clear_cache(Some("cached")).await;
        dispatcher.submit("cached", json!({"a": 1, "b": 2})).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_reclaims_slot() {
        let dispatcher = dispatcher(1);
        let slow = FnCapability::new(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        });
        let fast = FnCapability::new(|_| async { Ok(json!("fast")) });
        dispatcher
            .register(
                "slow",
                Arc::new(slow),
                CapabilityConfig::default().with_timeout(Duration::from_millis(50)),
            )
            .await;
        dispatcher
            .register("fast", Arc::new(fast), CapabilityConfig::default())
            .await;

        let started = Instant::now();
        let err = dispatcher.submit("slow", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::ExecutionTimeout {
                capability: "slow".to_string(),
                timeout_ms: 50
            }
        );
        assert_eq!(dispatcher.submit("fast", json!({})).await.unwrap(), json!("fast"));
        assert!(started.elapsed() < Duration::from_secs(2));

        let stats = dispatcher.capability_stats("slow").await.unwrap();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.status, CapabilityStatus::Idle);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_an_execution_error() {
        let dispatcher = dispatcher(1);
        let handler = FnCapability::new(|params: Value| async move {
            assert!(params.is_null(), "handler refuses parameters");
            Ok(json!(null))
        });
        dispatcher
            .register("picky", Arc::new(handler), CapabilityConfig::default())
            .await;

        let err = dispatcher.submit("picky", json!({"x": 1})).await.unwrap_err();
        assert!(matches!(err, DispatchError::ExecutionError { .. }));
        assert_eq!(dispatcher.in_flight().await, 0);
        assert_eq!(dispatcher.submit("picky", Value::Null).await.unwrap(), json!(null));
    }

    #[tokio::test]
    async fn test_dispatcher_stats_aggregates() {
        let dispatcher = dispatcher(3);
        let handler = FnCapability::new(|_| async { Err(CapabilityError::new("nope")) });
        dispatcher
            .register("broken", Arc::new(handler), CapabilityConfig::default())
            .await;
        let _ = dispatcher.submit("broken", json!({})).await;

        let stats = dispatcher.dispatcher_stats().await;
        assert_eq!(stats.max_concurrency, 3);
        assert_eq!(stats.queue_depth, 0);
        assert!((stats.error_rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.capabilities.len(), 1);
    }
}
