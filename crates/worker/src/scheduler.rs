//! Polling loops that drive the task runtime.
//!
//! Every registered task name and every exportable `(type, status)` pair gets
//! its own loop, plus one housekeeping sweep. The loops share nothing but the
//! store, so any number of worker processes can run them side by side.

use std::future::Future;
use std::time::Duration;

use chrono::OutOfRangeError;
use domain::{TaskName, TransactionStatus, TransactionType};
use saga::{EXPORTABLE, TaskExporter};
use tasks::TaskRuntime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;

/// Loop cadences and sweep thresholds.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub poll: Duration,
    pub export: Duration,
    pub sweep: Duration,
    pub retry: chrono::Duration,
    pub abort: chrono::Duration,
    pub reexport: chrono::Duration,
}

impl Intervals {
    pub fn from_config(config: &Config) -> Result<Self, OutOfRangeError> {
        Ok(Self {
            poll: config.task_poll_interval,
            export: config.task_export_interval,
            sweep: config.sweep_interval,
            retry: chrono::Duration::from_std(config.task_retry_interval)?,
            abort: chrono::Duration::from_std(config.task_abort_interval)?,
            reexport: chrono::Duration::from_std(config.reexport_interval)?,
        })
    }
}

#[derive(Clone)]
pub struct Scheduler {
    runtime: TaskRuntime,
    exporter: TaskExporter,
    intervals: Intervals,
}

impl Scheduler {
    pub fn new(runtime: TaskRuntime, exporter: TaskExporter, intervals: Intervals) -> Self {
        Self {
            runtime,
            exporter,
            intervals,
        }
    }

    /// Spawns every loop; each one stops once `shutdown` turns true.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for name in self.runtime.registry().names() {
            let runtime = self.runtime.clone();
            handles.push(tokio::spawn(every(
                self.intervals.poll,
                shutdown.clone(),
                move || {
                    let runtime = runtime.clone();
                    async move { drain_tasks(&runtime, name).await }
                },
            )));
        }

        for (type_of, status) in EXPORTABLE {
            let exporter = self.exporter.clone();
            handles.push(tokio::spawn(every(
                self.intervals.export,
                shutdown.clone(),
                move || {
                    let exporter = exporter.clone();
                    async move { export_pending(&exporter, type_of, status).await }
                },
            )));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(every(
            self.intervals.sweep,
            shutdown,
            move || {
                let scheduler = scheduler.clone();
                async move { scheduler.sweep().await }
            },
        )));

        tracing::info!(loops = handles.len(), "scheduler started");
        handles
    }

    /// Expires overdue transactions, then runs the retry, abort and
    /// re-export sweeps. Each step runs even if an earlier one failed.
    pub async fn sweep(&self) {
        if let Err(err) = self.exporter.make_expired().await {
            tracing::error!(error = %err, "expiration sweep failed");
        }
        if let Err(err) = self.runtime.retry(self.intervals.retry).await {
            tracing::error!(error = %err, "retry sweep failed");
        }
        if let Err(err) = self.runtime.abort(self.intervals.abort).await {
            tracing::error!(error = %err, "abort sweep failed");
        }
        if let Err(err) = self.exporter.reexport_tasks(self.intervals.reexport).await {
            tracing::error!(error = %err, "re-export sweep failed");
        }
    }
}

/// Runs `tick` every `period` until shutdown is signaled.
async fn every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => tick().await,
        }
    }
}

/// Executes due tasks of `name` until none is left.
async fn drain_tasks(runtime: &TaskRuntime, name: TaskName) {
    loop {
        match runtime.execute_by_name(name).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(task_name = %name, error = %err, "task execution failed");
                break;
            }
        }
    }
}

/// Exports pending transactions of one `(type, status)` pair until none is left.
async fn export_pending(exporter: &TaskExporter, type_of: TransactionType, status: TransactionStatus) {
    loop {
        match exporter.export_tasks(type_of, status).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%type_of, %status, error = %err, "task export failed");
                break;
            }
        }
    }
}
