//! External process execution.
//!
//! Every external tool the worker drives (the container runtime, the ledger
//! CLI, the trusted workload) goes through [`CommandRunner`]. Arguments are
//! always passed as a vector; nothing is interpreted by a shell.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, WorkerError};

/// Captured result of a process that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout with trailing newlines removed
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// Fails with [`WorkerError::CommandNotFound`] when `program` cannot be
    /// located and with [`WorkerError::CommandFailed`] on a non-zero exit.
    /// Implementations do not retry.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands as real child processes.
///
/// Children are spawned with `kill_on_drop`, so dropping the returned future
/// (timeout, request cancellation) kills the child and tokio reaps it.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn process_output(program: &str, output: std::process::Output) -> Result<CommandOutput> {
        let stdout = strip_trailing_newlines(&String::from_utf8_lossy(&output.stdout)).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if output.status.success() {
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code,
            })
        } else {
            tracing::debug!(program, exit_code = ?exit_code, stderr = %stderr.trim(), "Command failed");
            Err(WorkerError::CommandFailed {
                program: program.to_string(),
                exit_code,
                stderr: if stderr.trim().is_empty() {
                    format!("Exit code: {:?}", exit_code)
                } else {
                    stderr.trim().to_string()
                },
            })
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(program, args = ?args, "Running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => WorkerError::CommandNotFound {
                    program: program.to_string(),
                },
                _ => WorkerError::Io(e),
            })?;

        let output = child.wait_with_output().await?;
        Self::process_output(program, output)
    }
}

/// Removes trailing `\n` / `\r` only; leading and inner whitespace is part
/// of the output and therefore of the commitment.
pub fn strip_trailing_newlines(s: &str) -> &str {
    s.trim_end_matches(['\n', '\r'])
}
