use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::error::{Result, WorkerError};
use crate::ledger::{LedgerClient, Task, TaskStatus};
use crate::source::TaskSource;
use crate::worker::{Outcome, Pipeline};

/// Counters for one pass over the id range.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids whose status was queried
    pub scanned: u64,
    /// Ids skipped because they were already submitted
    pub skipped: u64,
    pub open: u64,
    pub submitted: u64,
    pub failed: u64,
}

/// Discovers open tasks by scanning ids `[0, task_range)` on the ledger.
///
/// Runs on a single task: each open task is executed and submitted before
/// the next id is examined. A failed task is not recorded, so the next
/// cycle picks it up again while it stays open.
pub struct Poller {
    config: PollerConfig,
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<Pipeline>,
}

impl Poller {
    pub fn new(config: PollerConfig, ledger: Arc<dyn LedgerClient>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            ledger,
            pipeline,
        }
    }

    /// One pass over the id range. Stops early if `shutdown` fires.
    pub async fn poll_cycle(&self, shutdown: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        for task_id in 0..self.config.task_range {
            if shutdown.is_cancelled() {
                break;
            }
            if self.pipeline.is_processed(task_id) {
                report.skipped += 1;
                continue;
            }

            report.scanned += 1;
            let status = match self.ledger.task_status(task_id).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(task_id, error = %e, "Status query failed");
                    TaskStatus::Unknown
                }
            };

            if status == TaskStatus::Open {
                report.open += 1;
                tracing::info!(task_id, "Found open task");
                let task = self.resolve(task_id).await;
                match self.pipeline.process(&task).await {
                    Ok(Outcome::Submitted(record)) => {
                        report.submitted += 1;
                        tracing::info!(task_id, tx_hash = %record.tx_hash, "Task submitted");
                    }
                    Ok(Outcome::AlreadySubmitted(_)) => report.skipped += 1,
                    Err(e @ WorkerError::ExecutorUnavailable { .. }) => {
                        report.failed += 1;
                        tracing::error!(task_id, error = %e, "Sandbox runtime unavailable");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(task_id, error = %e, "Task failed, will retry next cycle");
                    }
                }
            } else {
                tracing::debug!(task_id, status = %status, "Task not open");
            }

            if !pause(shutdown, self.config.check_interval).await {
                break;
            }
        }

        report
    }

    /// Build the task snapshot for an open id.
    ///
    /// Uses the image and input recorded on-chain when they can be read,
    /// otherwise the configured defaults.
    async fn resolve(&self, task_id: u64) -> Task {
        if !self.config.force_defaults {
            match self.ledger.task_details(task_id).await {
                Ok(details) if !details.image_uri.trim().is_empty() => {
                    return details.into_task(task_id);
                }
                Ok(_) => tracing::warn!(task_id, "Task has no image, using defaults"),
                Err(e) => tracing::warn!(task_id, error = %e, "Task details unavailable, using defaults"),
            }
        }
        Task::new(
            task_id,
            self.config.default_image.clone(),
            self.config.default_input.clone(),
        )
    }
}

#[async_trait]
impl TaskSource for Poller {
    async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            task_range = self.config.task_range,
            "Polling ledger for open tasks"
        );

        loop {
            let report = self.poll_cycle(&shutdown).await;
            tracing::info!(
                scanned = report.scanned,
                open = report.open,
                submitted = report.submitted,
                failed = report.failed,
                "Polling cycle complete"
            );

            if !pause(&shutdown, self.config.cycle_interval).await {
                break;
            }
        }

        tracing::info!("Poller stopped");
        Ok(())
    }
}

/// Sleep for `duration`; returns false if `shutdown` fired first.
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
