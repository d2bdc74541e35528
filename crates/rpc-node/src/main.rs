//! # RPC Node
//!
//! Runs the protocol in one of three modes:
//!
//! ```text
//! rpc-node [NUMBERS]   in-process broker, worker and client (demo)
//! rpc-node worker      serve the work queue of an AMQP broker until Ctrl+C
//! rpc-node call N...   one call through an AMQP broker
//! ```
//!
//! ```text
//! stdin/argv ──→ RpcClient ──→ [gpu_processing_queue] ──→ WorkerEngine
//!                    ↑                                         │
//!                    └────────── [amq.gen-…] ←── reply ────────┘
//! ```
//!
//! ## Demo Startup Sequence
//!
//! 1. Parse CLI flags, initialize telemetry
//! 2. Resolve the input batch (argv, else one line of stdin)
//! 3. Select the compute kernel
//! 4. Start the in-memory broker and the worker on its own connection
//! 5. Open a client session on a second connection and make one call
//! 6. Print the result, then shut the worker down

mod input;
mod remote;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::input::{format_batch, resolve_batch, BatchSource};
use crate::remote::DEFAULT_AMQP_URL;
use rpc_broker::{InMemoryBroker, Transport};
use rpc_client::{CallResult, ClientConfig, ClientError, RpcClient};
use rpc_compute::{auto_detect, create_backend, Backend, ComputeKernel};
use rpc_telemetry::{gather_metrics, init_telemetry, TelemetryConfig};
use rpc_worker::{WorkerConfig, WorkerEngine};

/// Send an integer batch to the compute worker and print the result.
#[derive(Debug, Parser)]
#[command(name = "rpc-node", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    #[command(flatten)]
    call: CallArgs,

    #[command(flatten)]
    worker: WorkerArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Serve the work queue of an AMQP broker until Ctrl+C
    Worker {
        #[command(flatten)]
        broker: BrokerArgs,
        #[command(flatten)]
        worker: WorkerArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Send one batch through an AMQP broker
    Call {
        #[command(flatten)]
        broker: BrokerArgs,
        #[command(flatten)]
        call: CallArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Args)]
struct BrokerArgs {
    /// AMQP broker URL
    #[arg(long, env = "RPC_AMQP_URL", default_value = DEFAULT_AMQP_URL, hide_env_values = true)]
    amqp_url: String,
}

#[derive(Debug, Args)]
struct CallArgs {
    /// Integers to send. Prompts on stdin when omitted.
    #[arg(allow_negative_numbers = true)]
    numbers: Vec<i32>,

    /// Seconds to wait for the reply
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl CallArgs {
    fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::from_env();
        match self.timeout_secs {
            Some(secs) => config.with_default_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    async fn batch(&self) -> Result<Vec<i32>> {
        if self.numbers.is_empty() {
            prompt_batch().await
        } else {
            Ok(self.numbers.clone())
        }
    }
}

#[derive(Debug, Args)]
struct WorkerArgs {
    /// Deliveries the worker handles concurrently
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Compute backend
    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,
}

impl WorkerArgs {
    fn worker_config(&self) -> WorkerConfig {
        let config = WorkerConfig::from_env();
        match self.max_in_flight {
            Some(n) => config.with_max_in_flight(n),
            None => config,
        }
    }
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,
}

impl OutputArgs {
    fn print_metrics(&self) -> Result<()> {
        if self.metrics {
            println!("{}", gather_metrics().context("Failed to render metrics")?);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    Auto,
    Cpu,
    Opencl,
}

fn select_kernel(choice: BackendChoice) -> Result<Arc<dyn ComputeKernel>> {
    let kernel = match choice {
        BackendChoice::Auto => auto_detect(),
        BackendChoice::Cpu => create_backend(Backend::Cpu),
        BackendChoice::Opencl => create_backend(Backend::OpenCL),
    };
    kernel.with_context(|| format!("Failed to initialize {choice:?} compute backend"))
}

async fn prompt_batch() -> Result<Vec<i32>> {
    println!("Enter integers separated by spaces (or press Enter for the sample):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines
        .next_line()
        .await
        .context("Failed to read stdin")?
        .unwrap_or_default();

    let (batch, source) = resolve_batch(&line);
    match source {
        BatchSource::Parsed => {}
        BatchSource::Sample => println!("Using sample data: {}", format_batch(&batch)),
        BatchSource::Fallback(reason) => {
            warn!(reason = %reason, "Invalid input, using sample data");
            println!("Invalid input, using sample data: {}", format_batch(&batch));
        }
    }
    Ok(batch)
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Run `engine` until `stop` resolves or the engine fails.
async fn serve(engine: &WorkerEngine, stop: impl Future<Output = ()>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = engine.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result.context("Worker stopped with an error"),
        () = stop => info!("Stopping worker"),
    }
    shutdown_tx.send_replace(true);
    run.await.context("Worker stopped with an error")
}

/// Open a session, make one call and close the session. `None` when
/// interrupted.
async fn call_once(
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    batch: &[i32],
    stop: impl Future<Output = ()>,
) -> Result<Option<CallResult>> {
    let timeout = config.default_timeout;
    let client = RpcClient::connect(transport, config)
        .await
        .context("Failed to open client session")?;

    println!("Sending request to the compute worker...");
    let outcome = tokio::select! {
        result = client.call(batch.to_vec(), timeout) => Some(result),
        () = stop => {
            warn!("Interrupted, shutting down");
            None
        }
    };

    client.close().await.context("Failed to close client session")?;
    Ok(outcome)
}

fn report(batch: &[i32], outcome: Option<CallResult>) -> Result<()> {
    match outcome {
        Some(Ok(result)) => {
            println!("\n=== RESULTS ===");
            println!("Input:  {}", format_batch(batch));
            println!("Result: {}", format_batch(&result));
        }
        Some(Err(ClientError::Timeout { after, .. })) => {
            println!("Timeout - no reply from the worker within {after:?}.");
        }
        Some(Err(e)) => return Err(e).context("Call failed"),
        None => {}
    }
    Ok(())
}

async fn run_demo(call: CallArgs, worker: WorkerArgs, output: OutputArgs) -> Result<()> {
    let batch = call.batch().await?;
    let kernel = select_kernel(worker.backend)?;

    let broker = InMemoryBroker::new();
    let engine = WorkerEngine::new(
        Arc::new(broker.connect().context("Failed to open worker connection")?),
        kernel,
        worker.worker_config(),
    );
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker_task = tokio::spawn(async move {
        serve(&engine, async {
            let _ = stop_rx.await;
        })
        .await
    });

    let outcome = call_once(
        Arc::new(broker.connect().context("Failed to open client connection")?),
        call.client_config(),
        &batch,
        interrupted(),
    )
    .await;

    let _ = stop_tx.send(());
    let worker_result = worker_task.await.context("Worker task panicked")?;
    broker.shutdown();

    output.print_metrics()?;
    report(&batch, outcome?)?;
    worker_result
}

async fn run_worker(broker: BrokerArgs, worker: WorkerArgs, output: OutputArgs) -> Result<()> {
    let kernel = select_kernel(worker.backend)?;
    let transport = remote::connect(&broker.amqp_url).await?;
    let engine = WorkerEngine::new(Arc::clone(&transport), kernel, worker.worker_config());

    println!("Worker serving, press Ctrl+C to stop");
    let served = serve(&engine, interrupted()).await;
    transport
        .close()
        .await
        .context("Failed to close broker connection")?;

    output.print_metrics()?;
    served
}

async fn run_call(broker: BrokerArgs, call: CallArgs, output: OutputArgs) -> Result<()> {
    let batch = call.batch().await?;
    let transport = remote::connect(&broker.amqp_url).await?;
    let outcome = call_once(transport, call.client_config(), &batch, interrupted()).await?;

    output.print_metrics()?;
    report(&batch, outcome)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    match cli.mode {
        None => run_demo(cli.call, cli.worker, cli.output).await?,
        Some(Mode::Worker {
            broker,
            worker,
            output,
        }) => run_worker(broker, worker, output).await?,
        Some(Mode::Call {
            broker,
            call,
            output,
        }) => run_call(broker, call, output).await?,
    }

    info!("Node stopped");
    Ok(())
}
