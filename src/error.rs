use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Executable not found: {program}")]
    CommandNotFound { program: String },

    #[error("{program} exited with code {exit_code:?}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Sandbox runtime '{runtime}' is not available")]
    ExecutorUnavailable { runtime: String },

    #[error("Execution of image '{image}' failed: {reason}")]
    ExecutionFailed { image: String, reason: String },

    #[error("Execution of image '{image}' timed out after {limit:?}")]
    Timeout { image: String, limit: Duration },

    #[error("Submission for task {task_id} failed: {reason}")]
    SubmissionFailed { task_id: u64, reason: String },

    #[error("Task {0} is already being processed")]
    TaskInFlight(u64),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
