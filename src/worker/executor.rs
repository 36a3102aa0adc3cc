use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::command::CommandRunner;
use crate::config::SandboxConfig;
use crate::error::{Result, WorkerError};

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Executes task workloads in containers with cleanup guarantees.
///
/// Every sandboxed execution follows the same lifecycle:
/// 1. `pull` the image (failure is tolerated, the image may be local)
/// 2. `run --rm` it with the task input as its only argument
/// 3. `rmi` the image, whatever happened in 1 and 2
///
/// The image named by [`SandboxConfig::trusted_image`] skips all three steps
/// and runs [`SandboxConfig::trusted_program`] directly.
#[derive(Clone)]
pub struct SandboxExecutor {
    config: SandboxConfig,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Probe the container runtime. Used for start-up diagnostics only.
    pub async fn runtime_available(&self) -> bool {
        self.runner
            .run(&self.config.runtime, &["version".to_string()])
            .await
            .is_ok()
    }

    /// Execute `image` with `input` and return its stdout.
    ///
    /// With a `run_timeout`, fetch and run share one deadline and eviction
    /// gets its own. If the returned future is dropped before it completes,
    /// the container is killed and the image evicted in the background.
    pub async fn execute(&self, image: &str, input: &str) -> Result<String> {
        if self.config.is_trusted(image) {
            return self.run_trusted(image, input).await;
        }

        tracing::info!(image, runtime = %self.config.runtime, "Executing task image");

        let name = format!(
            "compute-worker-{}-{}",
            std::process::id(),
            CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let cleanup = Cleanup {
            runner: self.runner.clone(),
            runtime: self.config.runtime.clone(),
            container: name.clone(),
            image: image.to_string(),
            armed: true,
        };
        let deadline = self.config.run_timeout.map(Deadline::starting_now);

        self.fetch(image, deadline).await;
        let result = self.run(&name, image, input, deadline).await;
        self.evict(image).await;
        cleanup.disarm();

        match &result {
            Ok(output) => tracing::info!(image, bytes = output.len(), "Execution completed"),
            Err(e) => tracing::warn!(image, error = %e, "Execution failed"),
        }
        result
    }

    async fn fetch(&self, image: &str, deadline: Option<Deadline>) {
        let args = vec!["pull".to_string(), image.to_string()];
        let pull = self.runner.run(&self.config.runtime, &args);
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.at, pull).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(image, "Pull did not finish in time, proceeding");
                    return;
                }
            },
            None => pull.await,
        };
        if let Err(e) = outcome {
            tracing::warn!(image, error = %e, "Pull failed or image is local, proceeding");
        }
    }

    async fn run(
        &self,
        name: &str,
        image: &str,
        input: &str,
        deadline: Option<Deadline>,
    ) -> Result<String> {
        let args = self.run_args(name, image, input);
        let invocation = self.runner.run(&self.config.runtime, &args);

        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.at, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.kill(name).await;
                    return Err(timeout_error(image, deadline.limit));
                }
            },
            None => invocation.await,
        };

        match outcome {
            Ok(output) => non_empty(image, output.stdout),
            Err(WorkerError::CommandNotFound { .. }) => Err(WorkerError::ExecutorUnavailable {
                runtime: self.config.runtime.clone(),
            }),
            Err(WorkerError::CommandFailed { stderr, .. }) => Err(WorkerError::ExecutionFailed {
                image: image.to_string(),
                reason: stderr,
            }),
            Err(e) => Err(WorkerError::ExecutionFailed {
                image: image.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// `--rm` only removes the container once it stops; a timed-out client
    /// leaves it running, so stop it by name.
    async fn kill(&self, name: &str) {
        let args = vec!["kill".to_string(), name.to_string()];
        if let Err(e) = self.runner.run(&self.config.runtime, &args).await {
            tracing::debug!(container = name, error = %e, "Container kill failed");
        }
    }

    async fn evict(&self, image: &str) {
        let args = vec!["rmi".to_string(), image.to_string()];
        let rmi = self.runner.run(&self.config.runtime, &args);
        let outcome = match self.config.run_timeout {
            Some(limit) => tokio::time::timeout(limit, rmi)
                .await
                .unwrap_or_else(|_| Err(timeout_error(image, limit))),
            None => rmi.await,
        };
        match outcome {
            Ok(_) => tracing::debug!(image, "Image evicted"),
            Err(e) => tracing::debug!(image, error = %e, "Image eviction failed"),
        }
    }

    fn run_args(&self, name: &str, image: &str, input: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            format!("--name={}", name),
        ];

        if self.config.network_disabled {
            args.push("--network=none".to_string());
        }
        if let Some(ref limit) = self.config.memory_limit {
            args.push(format!("--memory={}", limit));
        }
        if let Some(ref limit) = self.config.cpu_limit {
            args.push(format!("--cpus={}", limit));
        }
        if self.config.hardened {
            args.push("--cap-drop=ALL".to_string());
            args.push("--security-opt=no-new-privileges".to_string());
        }
        if self.config.read_only {
            args.push("--read-only".to_string());
        }

        args.push(image.to_string());
        if !input.trim().is_empty() {
            args.push(input.to_string());
        }
        args
    }

    async fn run_trusted(&self, image: &str, input: &str) -> Result<String> {
        let program = self.config.trusted_program.to_string_lossy().to_string();
        tracing::info!(image, program = %program, "Running trusted built-in workload");

        let args = vec![input.to_string()];
        let outcome = match self.config.run_timeout {
            Some(limit) => tokio::time::timeout(limit, self.runner.run(&program, &args))
                .await
                .map_err(|_| timeout_error(image, limit))?,
            None => self.runner.run(&program, &args).await,
        };

        match outcome {
            Ok(output) => non_empty(image, output.stdout),
            Err(WorkerError::CommandNotFound { program }) => {
                Err(WorkerError::ExecutorUnavailable { runtime: program })
            }
            Err(e) => Err(WorkerError::ExecutionFailed {
                image: image.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn non_empty(image: &str, stdout: String) -> Result<String> {
    if stdout.is_empty() {
        Err(WorkerError::ExecutionFailed {
            image: image.to_string(),
            reason: "workload produced no output".to_string(),
        })
    } else {
        Ok(stdout)
    }
}

fn timeout_error(image: &str, limit: Duration) -> WorkerError {
    WorkerError::Timeout {
        image: image.to_string(),
        limit,
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn starting_now(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }
}

/// Kills the container and evicts the image if an execution is abandoned
/// before it reaches its own eviction step.
struct Cleanup {
    runner: Arc<dyn CommandRunner>,
    runtime: String,
    container: String,
    image: String,
    armed: bool,
}

impl Cleanup {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(image = %self.image, "No runtime to clean up abandoned execution");
            return;
        };

        let runner = self.runner.clone();
        let runtime = std::mem::take(&mut self.runtime);
        let container = std::mem::take(&mut self.container);
        let image = std::mem::take(&mut self.image);
        tracing::info!(image = %image, container = %container, "Execution abandoned, cleaning up");

        handle.spawn(async move {
            let kill = vec!["kill".to_string(), container.clone()];
            if let Err(e) = runner.run(&runtime, &kill).await {
                tracing::debug!(container = %container, error = %e, "Container kill failed");
            }
            let rmi = vec!["rmi".to_string(), image.clone()];
            if let Err(e) = runner.run(&runtime, &rmi).await {
                tracing::debug!(image = %image, error = %e, "Image eviction failed");
            }
        });
    }
}
