//! Synthetic workload command.
//!
//! Registers one synthetic capability, submits a burst of tasks through the
//! orchestrator, then runs a single monitoring cycle over the resulting
//! statistics so planner and escalation behaviour can be observed end to end.

use anyhow::{Context, Result};
use clap::Args;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::adapters::{
    ChannelSink, StaticFallback, SystemMetricsSource, TracingSink, TunableStrategy,
};
use crate::application::{Orchestrator, ResilientOutcome};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::config::metric_names;
use crate::domain::models::{
    CapabilityConfig, CapabilityStats, MetricsSnapshot, Notification, Plan,
};
use crate::domain::ports::{Capability, FnCapability, NotificationSink};
use crate::domain::CapabilityError;

const CAPABILITY: &str = "synthetic";

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of tasks to submit
    #[arg(short, long, default_value_t = 10)]
    pub tasks: u64,

    /// Concurrency ceiling
    #[arg(short, long, default_value_t = 2)]
    pub concurrency: usize,

    /// Simulated execution latency per task
    #[arg(short, long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Fail every Nth task (0 never fails)
    #[arg(short, long, default_value_t = 0)]
    pub fail_every: u64,

    /// Route failures through retries and fallbacks
    #[arg(long)]
    pub resilient: bool,

    /// Configuration file to load over the defaults
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct SimulateOutput {
    pub submitted: u64,
    pub succeeded: u64,
    pub recovered: u64,
    pub failed: u64,
    pub elapsed_ms: u64,
    pub capabilities: Vec<CapabilityStats>,
    pub plan: Option<Plan>,
    pub notifications: Vec<Notification>,
}

impl CommandOutput for SimulateOutput {
    fn to_human(&self) -> String {
        let mut sections = vec![format!(
            "Submitted {} task(s) in {}ms: {} succeeded, {} recovered by fallback, {} failed",
            self.submitted, self.elapsed_ms, self.succeeded, self.recovered, self.failed
        )];

        let mut capabilities =
            list_table(&["name", "status", "success", "error", "avg ms", "last run"]);
        for stats in &self.capabilities {
            capabilities.add_row(vec![
                stats.name.clone(),
                stats.status.as_str().to_string(),
                stats.success_count.to_string(),
                stats.error_count.to_string(),
                format!("{:.1}", stats.avg_execution_time_ms),
                stats
                    .last_run_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%H:%M:%S%.3f").to_string()),
            ]);
        }
        sections.push(render_list("capability", &capabilities, self.capabilities.len()));

        sections.push(match &self.plan {
            Some(plan) if !plan.is_empty() => format!(
                "Plan: {} (benefit {:.2}, cost {:.2}, efficiency {:.2})",
                plan.strategies.join(" + "),
                plan.estimated_benefit,
                plan.estimated_cost,
                plan.efficiency()
            ),
            Some(_) => "Plan: no feasible strategy combination".to_string(),
            None => "Plan: metrics unavailable".to_string(),
        });

        let mut notifications = list_table(&["urgency", "kind", "message"]);
        for notification in &self.notifications {
            notifications.add_row(vec![
                notification.urgency.as_str().to_string(),
                format!("{:?}", notification.kind),
                truncate(&notification.message, 80),
            ]);
        }
        sections.push(render_list("notification", &notifications, self.notifications.len()));

        sections.join("\n\n")
    }
}

fn synthetic_capability(latency: Duration, fail_every: u64) -> Arc<dyn Capability> {
    Arc::new(FnCapability::new(move |params: Value| async move {
        tokio::time::sleep(latency).await;
        let index = params["index"].as_u64().unwrap_or_default();
        if fail_every > 0 && (index + 1) % fail_every == 0 {
            return Err(CapabilityError::new(format!("synthetic failure on task {index}")));
        }
        Ok(json!({ "index": index, "ok": true }))
    }))
}

async fn register_strategies(orchestrator: &Orchestrator) {
    orchestrator
        .register_strategy(Arc::new(
            TunableStrategy::new("shed-load", 2.0, 6.0)
                .triggered_by(metric_names::SYSTEM_LOAD, 0.5, 1.0)
                .with_effect(metric_names::SYSTEM_LOAD, 0.7),
        ))
        .await;
    orchestrator
        .register_strategy(Arc::new(
            TunableStrategy::new("isolate-failures", 1.0, 5.0)
                .triggered_by(metric_names::ERROR_RATE, 0.05, 0.3)
                .with_effect(metric_names::ERROR_RATE, 0.5),
        ))
        .await;
    orchestrator
        .register_strategy(Arc::new(
            TunableStrategy::new("warm-cache", 1.5, 3.0)
                .triggered_by(metric_names::RESPONSE_TIME_MS, 20.0, 200.0)
                .with_effect(metric_names::RESPONSE_TIME_MS, 0.6)
                .conflicts_with("shed-load"),
        ))
        .await;
    orchestrator
        .register_fallback(Arc::new(StaticFallback::new(
            "serve-degraded",
            1,
            json!({ "degraded": true }),
        )))
        .await;
}

/// Notifications of a run are logged and collected for the report.
fn run_sinks() -> (Vec<Arc<dyn NotificationSink>>, broadcast::Receiver<Notification>) {
    let channel = Arc::new(ChannelSink::default());
    let delivered = channel.subscribe();
    (vec![Arc::new(TracingSink), channel], delivered)
}

pub async fn execute(args: SimulateArgs, json_mode: bool) -> Result<()> {
    let mut config =
        super::config::load(args.file.as_ref()).context("Failed to load configuration")?;
    config.dispatcher.max_concurrency = args.concurrency.max(1);

    let (sinks, mut delivered) = run_sinks();
    let orchestrator = Orchestrator::with_sinks(config, sinks);

    orchestrator
        .register_capability(
            CAPABILITY,
            synthetic_capability(Duration::from_millis(args.latency_ms), args.fail_every),
            Some(CapabilityConfig::from_defaults(&orchestrator.config().dispatcher)),
        )
        .await;
    register_strategies(&orchestrator).await;

    let metrics_source = SystemMetricsSource::new(orchestrator.dispatcher().clone());
    let started = Instant::now();

    let (mut succeeded, mut recovered, mut failed) = (0, 0, 0);
    if args.resilient {
        let baseline = MetricsSnapshot::default();
        let submissions = (0..args.tasks).map(|index| {
            orchestrator.submit_resilient(CAPABILITY, json!({ "index": index }), &baseline)
        });
        for outcome in join_all(submissions).await {
            match outcome {
                Ok(ResilientOutcome::Primary(_)) => succeeded += 1,
                Ok(ResilientOutcome::Recovered { .. }) => recovered += 1,
                Ok(ResilientOutcome::Exhausted { .. }) | Err(_) => failed += 1,
            }
        }
    } else {
        let submissions = (0..args.tasks)
            .map(|index| orchestrator.submit(CAPABILITY, json!({ "index": index })));
        for result in join_all(submissions).await {
            if result.is_ok() {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let plan = orchestrator
        .run_cycle(&metrics_source, None)
        .await
        .map(|report| report.plan);

    let mut notifications = Vec::new();
    while let Ok(notification) = delivered.try_recv() {
        notifications.push(notification);
    }

    output(
        &SimulateOutput {
            submitted: args.tasks,
            succeeded,
            recovered,
            failed,
            elapsed_ms,
            capabilities: orchestrator.stats().await,
            plan,
            notifications,
        },
        json_mode,
    );
    Ok(())
}
