use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, WorkerError};
use crate::ledger::{ResultCommitter, SubmissionRecord, Task};
use crate::worker::dedup::ProcessedSet;
use crate::worker::executor::SandboxExecutor;

/// Result of pushing one task through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Executed and submitted during this call
    Submitted(SubmissionRecord),
    /// Submitted earlier by this process; nothing was run
    AlreadySubmitted(SubmissionRecord),
}

impl Outcome {
    pub fn record(&self) -> &SubmissionRecord {
        match self {
            Outcome::Submitted(r) | Outcome::AlreadySubmitted(r) => r,
        }
    }
}

#[derive(Debug, Default)]
struct PipelineState {
    processed: ProcessedSet,
    in_flight: HashSet<u64>,
}

/// Wires execution, commitment and deduplication for a single task.
///
/// Shared between request lanes behind an `Arc`. The state lock is held
/// only to claim, release and record task ids, never across the sandbox
/// run, so different task ids proceed in parallel while one id is
/// processed by at most one lane at a time.
pub struct Pipeline {
    executor: SandboxExecutor,
    committer: ResultCommitter,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(executor: SandboxExecutor, committer: ResultCommitter) -> Self {
        Self {
            executor,
            committer,
            state: Mutex::new(PipelineState::default()),
        }
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    pub fn is_processed(&self, task_id: u64) -> bool {
        self.lock().processed.contains(task_id)
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.lock().processed.records()
    }

    /// Execute `task`, commit its output and remember the submission.
    ///
    /// Any failure leaves the task id unrecorded so a later pass may try
    /// again. There is no retry inside one call.
    pub async fn process(&self, task: &Task) -> Result<Outcome> {
        let _claim = match self.claim(task.id)? {
            Claim::Done(record) => {
                tracing::debug!(task_id = task.id, "Task already submitted, skipping");
                return Ok(Outcome::AlreadySubmitted(record));
            }
            Claim::Acquired(guard) => guard,
        };

        tracing::info!(task_id = task.id, image = %task.image, "Processing task");

        let output = self.executor.execute(&task.image, &task.input).await?;
        let record = self.committer.commit(task.id, &output).await?;

        self.lock().processed.record(record.clone());
        Ok(Outcome::Submitted(record))
    }

    fn claim(&self, task_id: u64) -> Result<Claim<'_>> {
        let mut state = self.lock();
        if let Some(record) = state.processed.get(task_id) {
            return Ok(Claim::Done(record.clone()));
        }
        if !state.in_flight.insert(task_id) {
            return Err(WorkerError::TaskInFlight(task_id));
        }
        Ok(Claim::Acquired(InFlight {
            pipeline: self,
            task_id,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Claim<'a> {
    Done(SubmissionRecord),
    Acquired(InFlight<'a>),
}

/// Releases the in-flight claim on every exit path, including a dropped
/// request future.
struct InFlight<'a> {
    pipeline: &'a Pipeline,
    task_id: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pipeline.lock().in_flight.remove(&self.task_id);
    }
}
