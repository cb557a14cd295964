//! Common test utilities for integration tests
//!
//! Capabilities that record how they were scheduled, plus metrics sources
//! with scripted output.

#![allow(dead_code)]

use async_trait::async_trait;
use conductor::domain::ports::{Capability, MetricsSource};
use conductor::{CapabilityError, MetricsSnapshot};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Capability that sleeps, then echoes its parameters, while tracking how
/// many executions overlap and in which order they finish.
#[derive(Default)]
pub struct TrackedCapability {
    latency: Duration,
    /// Fail every Nth call (0 never fails)
    fail_every: usize,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    completed: Mutex<Vec<Value>>,
}

impl TrackedCapability {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Default::default()
        })
    }

    pub fn failing_every(latency: Duration, fail_every: usize) -> Arc<Self> {
        Arc::new(Self {
            latency,
            fail_every,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Executions currently inside the handler, detached ones included.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Parameters of finished executions, in completion order.
    pub fn completed(&self) -> Vec<Value> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Capability for TrackedCapability {
    async fn execute(&self, parameters: Value) -> Result<Value, CapabilityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(parameters.clone());

        if self.fail_every > 0 && call % self.fail_every == 0 {
            Err(CapabilityError::new(format!("injected failure on call {call}")))
        } else {
            Ok(parameters)
        }
    }
}

/// Metrics source replaying a fixed sequence; the last snapshot repeats.
pub struct ScriptedMetrics {
    snapshots: Mutex<VecDeque<MetricsSnapshot>>,
    last: Mutex<MetricsSnapshot>,
}

impl ScriptedMetrics {
    pub fn new(snapshots: impl IntoIterator<Item = MetricsSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().collect()),
            last: Mutex::new(MetricsSnapshot::default()),
        }
    }
}

#[async_trait]
impl MetricsSource for ScriptedMetrics {
    async fn snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let next = self.snapshots.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(snapshot) = next {
            *last = snapshot;
        }
        Ok(*last)
    }
}

/// Snapshot with only the error rate set.
pub fn error_rate(rate: f64) -> MetricsSnapshot {
    MetricsSnapshot {
        error_rate: rate,
        ..Default::default()
    }
}
