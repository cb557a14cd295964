//! The orchestrator composes the dispatcher, planner, fallback controller and
//! escalation monitor into one owned instance.
//!
//! Per-task flow goes through [`Orchestrator::submit`] or
//! [`Orchestrator::submit_resilient`]. Planning and escalation run on their
//! own cadence through [`Orchestrator::run_cycle`], either driven by the
//! caller or by the background loop from [`Orchestrator::start_monitoring`].

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::history::HistoryPersister;
use crate::adapters::JsonFileHistoryStore;
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::models::{
    CapabilityConfig, CapabilityStats, Config, EscalationState, FallbackOutcome, MetricsSnapshot,
    Notification, OptimizationImpact, Plan, PlanningContext, StepReport,
};
use crate::domain::ports::{
    Capability, FallbackStrategy, MemorySampler, MetricsSource, NotificationSink,
    OptimizationStrategy,
};
use crate::services::{
    DispatcherStats, EscalationMonitor, FallbackController, MemoryWatch, RetryPolicy,
    StrategyPlanner, TaskDispatcher,
};

/// Result of a submission that may have been retried and recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum ResilientOutcome {
    /// The capability itself produced the value.
    Primary(Value),
    /// The capability kept failing and a fallback strategy recovered.
    Recovered {
        strategy: String,
        output: Value,
        cause: DispatchError,
    },
    /// The capability kept failing and no fallback applied and succeeded.
    Exhausted {
        cause: DispatchError,
        attempted: Vec<String>,
    },
}

impl ResilientOutcome {
    /// The produced value, if any.
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Primary(value) | Self::Recovered { output: value, .. } => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// What one monitoring cycle observed and decided.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub metrics: MetricsSnapshot,
    pub plan: Plan,
    pub notifications: Vec<Notification>,
}

/// Handles of the loops started by [`Orchestrator::start_background`].
pub struct BackgroundTasks {
    pub monitoring: JoinHandle<Result<()>>,
    pub memory_watch: JoinHandle<Result<()>>,
    /// Present when `monitoring.history_path` is configured
    pub history: Option<JoinHandle<Result<()>>>,
}

impl BackgroundTasks {
    /// Wait for every loop to finish, returning the first failure.
    pub async fn join(self) -> Result<()> {
        let handles = [Some(self.monitoring), Some(self.memory_watch), self.history];
        for handle in handles.into_iter().flatten() {
            handle.await.context("Background task panicked")??;
        }
        Ok(())
    }
}

fn interval_from_secs(setting: &str, secs: u64) -> Result<Duration> {
    ensure!(secs > 0, "{setting} must be greater than zero");
    Ok(Duration::from_secs(secs))
}

struct OrchestratorInner {
    config: Config,
    dispatcher: TaskDispatcher,
    planner: Mutex<StrategyPlanner>,
    fallback: Mutex<FallbackController>,
    monitor: Mutex<EscalationMonitor>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Constructor-injected orchestration core. Clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self::with_sinks(config, Vec::new())
    }

    /// Build an orchestrator whose escalation notifications go to `sinks`.
    pub fn with_sinks(config: Config, sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        let dispatcher = TaskDispatcher::new(&config.dispatcher);
        let planner = StrategyPlanner::from_config(&config.planner);
        let fallback = FallbackController::new(config.fallback.clone());
        let mut monitor = EscalationMonitor::new(config.escalation.clone());
        for sink in &sinks {
            monitor.add_sink(Arc::clone(sink));
        }
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                dispatcher,
                planner: Mutex::new(planner),
                fallback: Mutex::new(fallback),
                monitor: Mutex::new(monitor),
                sinks,
                shutdown_tx,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.inner.dispatcher
    }

    /// Register a capability. `None` uses the dispatcher defaults.
    pub async fn register_capability(
        &self,
        name: &str,
        handler: Arc<dyn Capability>,
        config: Option<CapabilityConfig>,
    ) -> bool {
        let config = config.unwrap_or_else(|| self.inner.dispatcher.default_capability_config());
        self.inner.dispatcher.register(name, handler, config).await
    }

    pub async fn register_strategy(&self, strategy: Arc<dyn OptimizationStrategy>) {
        self.inner.planner.lock().await.register(strategy);
    }

    /// Declare two optimization strategies mutually incompatible.
    pub async fn forbid_strategy_pair(&self, a: &str, b: &str) {
        self.inner.planner.lock().await.forbid_pair(a, b);
    }

    pub async fn register_fallback(&self, strategy: Arc<dyn FallbackStrategy>) {
        self.inner.fallback.lock().await.register(strategy);
    }

    /// Submit a task. Errors propagate unchanged.
    pub async fn submit(&self, capability: &str, parameters: Value) -> DispatchResult<Value> {
        self.inner.dispatcher.submit(capability, parameters).await
    }

    /// Submit a task, retrying with backoff and then falling back.
    ///
    /// Timeouts and handler failures are retried up to the capability's
    /// `max_retries`; once spent, the fallback chain runs against `metrics`.
    ///
    /// # Errors
    ///
    /// `CapabilityNotFound` only. It is neither retried nor handed to the
    /// fallback chain.
    pub async fn submit_resilient(
        &self,
        capability: &str,
        parameters: Value,
        metrics: &MetricsSnapshot,
    ) -> DispatchResult<ResilientOutcome> {
        let config = self
            .inner
            .dispatcher
            .capability_config(capability)
            .await
            .ok_or_else(|| DispatchError::CapabilityNotFound {
                name: capability.to_string(),
            })?;

        let policy = RetryPolicy::from_config(&self.inner.config.retry, config.max_retries);
        let dispatcher = &self.inner.dispatcher;
        let result = policy
            .execute(|| dispatcher.submit(capability, parameters.clone()))
            .await;

        let cause = match result {
            Ok(value) => return Ok(ResilientOutcome::Primary(value)),
            Err(e @ DispatchError::CapabilityNotFound { .. }) => return Err(e),
            Err(e) => e,
        };

        warn!(
            capability = %capability,
            error = %cause,
            "Retries exhausted, running fallback chain"
        );
        let outcome = self.inner.fallback.lock().await.execute_chain(metrics).await;

        Ok(match outcome {
            FallbackOutcome::Recovered { strategy, output } => ResilientOutcome::Recovered {
                strategy,
                output,
                cause,
            },
            FallbackOutcome::Exhausted { attempted } => {
                ResilientOutcome::Exhausted { cause, attempted }
            }
        })
    }

    /// Run one planning and escalation cycle.
    ///
    /// A failing metrics source is logged and yields `None`.
    pub async fn run_cycle(
        &self,
        source: &dyn MetricsSource,
        impact: Option<&OptimizationImpact>,
    ) -> Option<CycleReport> {
        let metrics = match source.snapshot().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "Metrics source failed, skipping cycle");
                return None;
            }
        };

        let plan = self.inner.planner.lock().await.plan(
            &metrics,
            &PlanningContext::default(),
            self.inner.config.planner.max_strategies,
        );
        let notifications = self.inner.monitor.lock().await.evaluate(&metrics, impact);

        debug!(
            strategies = plan.len(),
            notifications = notifications.len(),
            "Monitoring cycle complete"
        );
        Some(CycleReport {
            metrics,
            plan,
            notifications,
        })
    }

    /// Execute a plan and feed the reported costs back to the planner.
    pub async fn apply_plan(&self, plan: &Plan, parameters: &Value) -> Vec<StepReport> {
        self.inner
            .planner
            .lock()
            .await
            .execute_plan(plan, parameters)
            .await
    }

    /// Run [`Orchestrator::run_cycle`] every `every` until
    /// [`Orchestrator::shutdown`].
    pub fn start_monitoring(
        &self,
        source: Arc<dyn MetricsSource>,
        every: Duration,
    ) -> JoinHandle<Result<()>> {
        let orchestrator = self.clone();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            info!(interval_secs = every.as_secs(), "Monitoring started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        orchestrator.run_cycle(source.as_ref(), None).await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            info!("Monitoring stopped");
            Ok(())
        })
    }

    /// Start the monitoring cycle, the memory watch and, when
    /// `monitoring.history_path` is set, history persistence on their
    /// configured intervals. Saved history is restored before any loop runs.
    pub async fn start_background(
        &self,
        source: Arc<dyn MetricsSource>,
        sampler: Arc<dyn MemorySampler>,
    ) -> Result<BackgroundTasks> {
        let config = &self.inner.config;
        let cycle_every = interval_from_secs(
            "monitoring.cycle_interval_secs",
            config.monitoring.cycle_interval_secs,
        )?;
        let persist_every = interval_from_secs(
            "monitoring.persist_interval_secs",
            config.monitoring.persist_interval_secs,
        )?;
        let memory_every = interval_from_secs(
            "escalation.memory_check_interval_secs",
            config.escalation.memory_check_interval_secs,
        )?;

        let history = match &config.monitoring.history_path {
            Some(path) => {
                let store = Arc::new(JsonFileHistoryStore::new(path.clone()));
                let persister = HistoryPersister::new(self.clone(), store);
                persister.restore().await?;
                Some(persister.start(persist_every))
            }
            None => None,
        };

        let monitoring = self.start_monitoring(source, cycle_every);
        let memory_watch = self.memory_watch(sampler).start(memory_every);

        info!(
            cycle_secs = cycle_every.as_secs(),
            memory_check_secs = memory_every.as_secs(),
            persist_history = history.is_some(),
            "Background loops started"
        );
        Ok(BackgroundTasks {
            monitoring,
            memory_watch,
            history,
        })
    }

    /// Memory growth watch wired to this orchestrator's sinks and thresholds.
    /// Its loop stops on [`Orchestrator::shutdown`].
    pub fn memory_watch(&self, sampler: Arc<dyn MemorySampler>) -> MemoryWatch {
        MemoryWatch::linked(
            sampler,
            self.inner.config.escalation.memory_growth_threshold_mb,
            self.inner.sinks.clone(),
            self.inner.shutdown_tx.clone(),
        )
    }

    /// Subscribe to the shutdown signal, for loops owned by collaborators.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Stop every loop started from this orchestrator.
    pub fn shutdown(&self) {
        info!("Orchestrator shutting down");
        let _ = self.inner.shutdown_tx.send(());
    }

    pub async fn stats(&self) -> Vec<CapabilityStats> {
        self.inner.dispatcher.stats().await
    }

    pub async fn dispatcher_stats(&self) -> DispatcherStats {
        self.inner.dispatcher.dispatcher_stats().await
    }

    pub async fn clear_cache(&self, capability: Option<&str>) {
        self.inner.dispatcher.clear_cache(capability).await;
    }

    pub async fn export_history(&self) -> EscalationState {
        self.inner.monitor.lock().await.export_state()
    }

    pub async fn restore_history(&self, state: EscalationState) {
        self.inner.monitor.lock().await.restore_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChannelSink, StaticFallback, TunableStrategy};
    use crate::domain::models::Urgency;
    use crate::domain::ports::{FnCapability, HistoryStore};
    use crate::domain::CapabilityError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 5;
        config
    }

    /// Fails the first `failures` calls, then echoes.
    fn flaky(failures: u32, calls: &Arc<AtomicU32>) -> Arc<dyn Capability> {
        let calls = Arc::clone(calls);
        Arc::new(FnCapability::new(move |params: Value| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < failures {
                    Err(CapabilityError::new("transient"))
                } else {
                    Ok(params)
                }
            }
        }))
    }

    struct FixedSource(MetricsSnapshot);

    #[async_trait]
    impl MetricsSource for FixedSource {
        async fn snapshot(&self) -> Result<MetricsSnapshot> {
            Ok(self.0)
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl MetricsSource for BrokenSource {
        async fn snapshot(&self) -> Result<MetricsSnapshot> {
            anyhow::bail!("collector offline")
        }
    }

    struct FlatSampler;

    #[async_trait]
    impl MemorySampler for FlatSampler {
        async fn resident_mb(&self) -> Option<f64> {
            Some(64.0)
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_primary() {
        let orchestrator = Orchestrator::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));
        orchestrator
            .register_capability("flaky", flaky(2, &calls), None)
            .await;

        let outcome = orchestrator
            .submit_resilient("flaky", json!({"n": 1}), &MetricsSnapshot::default())
            .await
            .unwrap();
        assert_eq!(outcome, ResilientOutcome::Primary(json!({"n": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fallback_after_retries() {
        let orchestrator = Orchestrator::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));
        orchestrator
            .register_capability(
                "down",
                flaky(u32::MAX, &calls),
                Some(CapabilityConfig::default().with_max_retries(1)),
            )
            .await;
        orchestrator
            .register_fallback(Arc::new(StaticFallback::new("stale", 1, json!("cached"))))
            .await;

        let outcome = orchestrator
            .submit_resilient("down", json!({}), &MetricsSnapshot::default())
            .await
            .unwrap();
        match outcome {
            ResilientOutcome::Recovered { strategy, output, cause } => {
                assert_eq!(strategy, "stale");
                assert_eq!(output, json!("cached"));
                assert!(matches!(cause, DispatchError::ExecutionError { .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_without_fallbacks() {
        let orchestrator = Orchestrator::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));
        orchestrator
            .register_capability(
                "down",
                flaky(u32::MAX, &calls),
                Some(CapabilityConfig::default().with_max_retries(0)),
            )
            .await;

        let outcome = orchestrator
            .submit_resilient("down", json!({}), &MetricsSnapshot::default())
            .await
            .unwrap();
        assert!(outcome.is_exhausted());
        assert!(outcome.value().is_none());
    }

    #[tokio::test]
    async fn test_unknown_capability_never_falls_back() {
        let orchestrator = Orchestrator::new(fast_config());
        orchestrator
            .register_fallback(Arc::new(StaticFallback::new("stale", 1, json!("cached"))))
            .await;

        let result = orchestrator
            .submit_resilient("ghost", json!({}), &MetricsSnapshot::default())
            .await;
        assert_eq!(
            result,
            Err(DispatchError::CapabilityNotFound {
                name: "ghost".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cycle_plans_and_escalates() {
        let sink = Arc::new(ChannelSink::new(16));
        let mut notifications = sink.subscribe();
        let orchestrator = Orchestrator::with_sinks(Config::default(), vec![sink]);
        orchestrator
            .register_strategy(Arc::new(TunableStrategy::new("shed-load", 1.0, 4.0)))
            .await;

        let source = FixedSource(MetricsSnapshot {
            error_rate: 0.4,
            ..Default::default()
        });
        let report = orchestrator.run_cycle(&source, None).await.unwrap();

        assert_eq!(report.plan.strategies, vec!["shed-load"]);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].urgency, Urgency::Medium);
        assert_eq!(notifications.recv().await.unwrap().id, report.notifications[0].id);
        assert_eq!(orchestrator.export_history().await.records["error_rate"].len(), 1);
    }

    #[tokio::test]
    async fn test_failing_source_skips_cycle() {
        let orchestrator = Orchestrator::new(Config::default());
        assert!(orchestrator.run_cycle(&BrokenSource, None).await.is_none());
    }

    #[tokio::test]
    async fn test_monitoring_loop_stops_on_shutdown() {
        let orchestrator = Orchestrator::new(Config::default());
        let handle = orchestrator.start_monitoring(
            Arc::new(FixedSource(MetricsSnapshot::default())),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        orchestrator.shutdown();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_memory_watch_stops_on_shutdown() {
        let orchestrator = Orchestrator::new(Config::default());
        let handle = orchestrator
            .memory_watch(Arc::new(FlatSampler))
            .start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        orchestrator.shutdown();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_background_loops_run_from_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut config = Config::default();
        config.monitoring.history_path = Some(path.clone());
        let orchestrator = Orchestrator::new(config);

        let overloaded = MetricsSnapshot {
            system_load: 0.95,
            ..Default::default()
        };
        let tasks = orchestrator
            .start_background(Arc::new(FixedSource(overloaded)), Arc::new(FlatSampler))
            .await
            .unwrap();
        assert!(tasks.history.is_some());

        // The first monitoring tick fires immediately and records the breach.
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.shutdown();
        tokio::time::timeout(Duration::from_secs(1), tasks.join())
            .await
            .unwrap()
            .unwrap();

        let saved = JsonFileHistoryStore::new(path).load().await.unwrap().unwrap();
        assert!(saved.records.contains_key("system_load"));
    }

    #[tokio::test]
    async fn test_background_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitoring.cycle_interval_secs = 0;
        let orchestrator = Orchestrator::new(config);

        let err = orchestrator
            .start_background(
                Arc::new(FixedSource(MetricsSnapshot::default())),
                Arc::new(FlatSampler),
            )
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("cycle_interval_secs"));
    }
}
