use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use compute_worker::command::{CommandRunner, ProcessRunner};
use compute_worker::config::{
    WorkerConfig, DEFAULT_CHAIN, DEFAULT_CONTRACT_ADDRESS, DEFAULT_GAS_LIMIT, DEFAULT_PROXY,
    TRUSTED_IMAGE,
};
use compute_worker::error::WorkerError;
use compute_worker::ledger::{LedgerClient, MxpyLedger, ResultCommitter, Task};
use compute_worker::shutdown::install_shutdown_handler;
use compute_worker::source::{Poller, RequestServer, TaskSource};
use compute_worker::worker::{Outcome, Pipeline, SandboxExecutor};

#[derive(Parser, Debug)]
#[command(name = "compute-worker")]
#[command(version)]
#[command(about = "Worker node for a ledger-coordinated compute marketplace")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Scan the ledger for open tasks and process them continuously
    Poll(PollArgs),

    /// Accept task requests over HTTP
    Serve(ServeArgs),

    /// Execute and submit a single task, then exit
    Run(RunArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(clap::Args, Debug)]
struct LedgerArgs {
    /// Path to the worker wallet PEM file
    #[arg(long)]
    wallet: PathBuf,

    /// Task contract address
    #[arg(long, default_value = DEFAULT_CONTRACT_ADDRESS)]
    contract: String,

    /// Ledger gateway URL
    #[arg(long, default_value = DEFAULT_PROXY)]
    proxy: String,

    /// Chain identifier used when signing
    #[arg(long, default_value = DEFAULT_CHAIN)]
    chain: String,

    /// Gas limit for result submissions
    #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
    gas_limit: u64,

    /// Ledger client executable
    #[arg(long, default_value = "mxpy")]
    ledger_cli: String,

    /// Container runtime executable
    #[arg(long, default_value = "docker")]
    runtime: String,

    /// Executable serving the trusted built-in image
    /// (default: simple-processor next to this binary, else on PATH)
    #[arg(long)]
    trusted_program: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PollArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Run every open task with this image instead of the on-chain one
    #[arg(long)]
    image: Option<String>,

    /// Use this input instead of the on-chain one
    #[arg(long)]
    input: Option<String>,

    /// Number of task ids to scan, starting at 0
    #[arg(long, default_value = "10")]
    task_range: u64,

    /// Seconds between polling cycles
    #[arg(long, default_value = "5")]
    interval_secs: u64,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "5005")]
    port: u16,

    /// Upper bound for fetching and running one task image, in seconds
    #[arg(long, default_value = "300")]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// The id of the task to solve
    #[arg(long)]
    task_id: u64,

    /// Image to execute
    #[arg(long, default_value = TRUSTED_IMAGE)]
    image: String,

    /// Input payload passed to the image
    #[arg(long, default_value = r#"{"a":[1,2,3],"b":[4,5,6]}"#)]
    input: String,
}

// =============================================================================
// Wiring
// =============================================================================

fn build_config(args: &LedgerArgs) -> WorkerConfig {
    let mut config = WorkerConfig::new(&args.wallet);
    config.ledger = config.ledger.with_contract(&args.contract);
    config.ledger.proxy = args.proxy.clone();
    config.ledger.chain = args.chain.clone();
    config.ledger.gas_limit = args.gas_limit;
    config.ledger.cli = args.ledger_cli.clone();
    config.sandbox.runtime = args.runtime.clone();
    config.sandbox.trusted_program = args
        .trusted_program
        .clone()
        .unwrap_or_else(default_trusted_program);
    config
}

fn default_trusted_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("simple-processor")))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from("simple-processor"))
}

struct Components {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<Pipeline>,
}

fn build_components(config: &WorkerConfig) -> Components {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let ledger: Arc<dyn LedgerClient> =
        Arc::new(MxpyLedger::new(config.ledger.clone(), runner.clone()));
    let executor = SandboxExecutor::new(config.sandbox.clone(), runner);
    let committer = ResultCommitter::new(ledger.clone());

    Components {
        ledger,
        pipeline: Arc::new(Pipeline::new(executor, committer)),
    }
}

async fn check_runtime(pipeline: &Pipeline) {
    let executor = pipeline.executor();
    if !executor.runtime_available().await {
        tracing::warn!(
            runtime = %executor.config().runtime,
            "Container runtime not reachable; only the trusted image can run"
        );
    }
}

// =============================================================================
// Modes
// =============================================================================

async fn run_poller(args: PollArgs) -> Result<(), WorkerError> {
    let mut config = build_config(&args.ledger);
    config.poller.task_range = args.task_range;
    config.poller.cycle_interval = Duration::from_secs(args.interval_secs);
    if args.image.is_some() || args.input.is_some() {
        config.poller.force_defaults = true;
    }
    if let Some(image) = args.image {
        config.poller.default_image = image;
    }
    if let Some(input) = args.input {
        config.poller.default_input = input;
    }
    config.validate()?;

    tracing::info!(
        wallet = %config.ledger.wallet.display(),
        contract = %config.ledger.contract,
        "Starting polling worker"
    );

    let components = build_components(&config);
    check_runtime(&components.pipeline).await;

    let shutdown = install_shutdown_handler();
    let mut poller = Poller::new(config.poller, components.ledger, components.pipeline);
    poller.run(shutdown).await
}

async fn run_server(args: ServeArgs) -> Result<(), WorkerError> {
    let mut config = build_config(&args.ledger);
    config.server.listen_addr = format!("{}:{}", args.host, args.port)
        .parse::<SocketAddr>()
        .map_err(|e| WorkerError::Config(format!("invalid listen address: {}", e)))?;
    config.sandbox.run_timeout = Some(Duration::from_secs(args.timeout_secs));
    config.validate()?;

    tracing::info!(
        wallet = %config.ledger.wallet.display(),
        contract = %config.ledger.contract,
        listen_addr = %config.server.listen_addr,
        "Starting on-demand worker"
    );

    let components = build_components(&config);
    check_runtime(&components.pipeline).await;

    let shutdown = install_shutdown_handler();
    let mut server = RequestServer::new(config.server.listen_addr, components.pipeline);
    server.run(shutdown).await
}

async fn run_once(args: RunArgs) -> Result<(), WorkerError> {
    let config = build_config(&args.ledger);
    config.validate()?;

    tracing::info!(task_id = args.task_id, image = %args.image, "Running single task");

    let components = build_components(&config);
    let task = Task::new(args.task_id, args.image, args.input);
    match components.pipeline.process(&task).await? {
        Outcome::Submitted(record) | Outcome::AlreadySubmitted(record) => {
            println!("Task #{} submitted", record.task_id);
            println!("Commitment: {}", record.commitment);
            println!("Tx Hash:    {}", record.tx_hash);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Poll(poll_args) => run_poller(poll_args).await,
        Commands::Serve(serve_args) => run_server(serve_args).await,
        Commands::Run(run_args) => run_once(run_args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
