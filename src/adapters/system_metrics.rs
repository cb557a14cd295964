//! Metrics source and memory sampler backed by `sysinfo`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

use crate::domain::models::MetricsSnapshot;
use crate::domain::ports::{MemorySampler, MetricsSource};
use crate::services::TaskDispatcher;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Combines host figures with the dispatcher's own statistics.
///
/// - `system_load`: one-minute load average divided by the number of CPUs
/// - `cpu_load_pct` / `memory_usage_mb`: host CPU usage and used memory
/// - `task_queue_depth`, `error_rate`, `response_time_ms`: from the dispatcher
pub struct SystemMetricsSource {
    system: Mutex<System>,
    dispatcher: TaskDispatcher,
}

impl SystemMetricsSource {
    pub fn new(dispatcher: TaskDispatcher) -> Self {
        Self {
            system: Mutex::new(System::new()),
            dispatcher,
        }
    }
}

#[async_trait]
impl MetricsSource for SystemMetricsSource {
    async fn snapshot(&self) -> Result<MetricsSnapshot> {
        let (cpu_load_pct, memory_usage_mb, system_load) = {
            let mut sys = self.system.lock().await;
            sys.refresh_cpu_all();
            sys.refresh_memory();

            let cpus = sys.cpus().len().max(1) as f64;
            (
                f64::from(sys.global_cpu_usage()),
                sys.used_memory() as f64 / BYTES_PER_MB,
                System::load_average().one / cpus,
            )
        };

        let stats = self.dispatcher.dispatcher_stats().await;

        Ok(MetricsSnapshot {
            system_load,
            task_queue_depth: stats.queue_depth as f64,
            error_rate: stats.error_rate(),
            response_time_ms: stats.mean_execution_time_ms(),
            memory_usage_mb,
            cpu_load_pct,
            captured_at: Utc::now(),
        })
    }
}

/// Reads the resident memory of the current process.
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemorySampler for ProcessMemorySampler {
    async fn resident_mb(&self) -> Option<f64> {
        let pid = self.pid?;
        let mut sys = self.system.lock().await;
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(|p| p.memory() as f64 / BYTES_PER_MB)
    }
}
