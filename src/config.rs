use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WorkerError};

/// Contract the dApp deployed on devnet.
pub const DEFAULT_CONTRACT_ADDRESS: &str =
    "erd1qqqqqqqqqqqqqpgqfgayg3ykmn6jluazdfhka02y3q9vjc8wnc0syn2dwx";
pub const DEFAULT_PROXY: &str = "https://devnet-api.multiversx.com";
pub const DEFAULT_CHAIN: &str = "D";
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;

/// Image name that runs the built-in multiply workload without a container.
pub const TRUSTED_IMAGE: &str = "simple-processor";

/// Configuration for container-based task execution.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container runtime binary (`docker`, `podman`, ...)
    pub runtime: String,
    /// Disable network access in container
    pub network_disabled: bool,
    /// Memory limit (e.g., "256m")
    pub memory_limit: Option<String>,
    /// CPU limit (e.g., "0.5" for half a CPU)
    pub cpu_limit: Option<String>,
    /// Drop all capabilities and forbid privilege escalation
    pub hardened: bool,
    /// Mount the container root filesystem read-only
    pub read_only: bool,
    /// Upper bound on a single `run`; `None` waits indefinitely
    pub run_timeout: Option<Duration>,
    /// Image name that bypasses the sandbox entirely.
    ///
    /// This is the one exception to sandboxed execution: the named image is
    /// served by `trusted_program`, a local executable shipped with the
    /// worker, invoked with the task input as its only argument.
    pub trusted_image: Option<String>,
    /// Executable backing `trusted_image`
    pub trusted_program: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            // The curation workload may fetch its input over HTTP
            network_disabled: false,
            memory_limit: None,
            cpu_limit: None,
            hardened: true,
            read_only: false,
            run_timeout: None,
            trusted_image: Some(TRUSTED_IMAGE.to_string()),
            trusted_program: PathBuf::from("simple-processor"),
        }
    }
}

impl SandboxConfig {
    pub fn is_trusted(&self, image: &str) -> bool {
        self.trusted_image.as_deref() == Some(image)
    }
}

/// Connection details for the ledger CLI (`mxpy`).
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub cli: String,
    pub contract: String,
    pub proxy: String,
    pub chain: String,
    pub gas_limit: u64,
    /// PEM wallet used to sign `submitResult` transactions
    pub wallet: PathBuf,
}

impl LedgerConfig {
    pub fn new(wallet: impl Into<PathBuf>) -> Self {
        Self {
            cli: "mxpy".to_string(),
            contract: DEFAULT_CONTRACT_ADDRESS.to_string(),
            proxy: DEFAULT_PROXY.to_string(),
            chain: DEFAULT_CHAIN.to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            wallet: wallet.into(),
        }
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = contract.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Task ids `[0, task_range)` are scanned every cycle
    pub task_range: u64,
    /// Pause between two status queries
    pub check_interval: Duration,
    /// Pause between two full cycles
    pub cycle_interval: Duration,
    pub default_image: String,
    pub default_input: String,
    /// Skip on-chain task details and always use the defaults above
    pub force_defaults: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            task_range: 10,
            check_interval: Duration::from_millis(500),
            cycle_interval: Duration::from_secs(5),
            default_image: TRUSTED_IMAGE.to_string(),
            default_input: r#"{"a":[1,2,3],"b":[4,5,6]}"#.to_string(),
            force_defaults: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5005)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub ledger: LedgerConfig,
    pub sandbox: SandboxConfig,
    pub poller: PollerConfig,
    pub server: ServerConfig,
}

impl WorkerConfig {
    pub fn new(wallet: impl Into<PathBuf>) -> Self {
        Self {
            ledger: LedgerConfig::new(wallet),
            sandbox: SandboxConfig::default(),
            poller: PollerConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Checks everything that must hold before any task work starts.
    pub fn validate(&self) -> Result<()> {
        validate_wallet(&self.ledger.wallet)?;
        if self.ledger.contract.trim().is_empty() {
            return Err(WorkerError::Config("contract address is empty".to_string()));
        }
        if self.poller.task_range == 0 {
            return Err(WorkerError::Config(
                "task range must cover at least one id".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_wallet(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WorkerError::Config(format!(
            "Wallet file not found at {}",
            path.display()
        )))
    }
}
