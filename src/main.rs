use clap::Parser;
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use calc_lite::config::{SchedulerConfig, ServiceConfig};
use calc_lite::console::{self, ConsoleCommand, OutputFormat, Reply};
use calc_lite::eval::{format_value, validate_expression, ArithmeticEvaluator, Evaluator};
use calc_lite::persistence::JsonFileStore;
use calc_lite::service::CalcService;
use calc_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "calc-lite")]
#[command(version)]
#[command(about = "Delayed arithmetic evaluation with a polling scheduler pool")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the scheduler and read commands from stdin
    Serve(ServeArgs),

    /// Evaluate one expression immediately and exit
    Eval {
        /// The expression, e.g. "(1 + 2) * 3"
        expression: String,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Number of pool workers scanning for pending jobs
    #[arg(long, default_value = "5")]
    workers: usize,

    /// Milliseconds between two scans of one worker
    #[arg(long, default_value = "1000")]
    scan_interval_ms: u64,

    /// Milliseconds between executor heartbeats
    #[arg(long, default_value = "2000")]
    heartbeat_interval_ms: u64,

    /// Countdown given to each new job, in milliseconds
    #[arg(long, default_value = "10000")]
    job_duration_ms: u64,

    /// Amount `extend <id>` adds when no amount is given, in milliseconds
    #[arg(long, default_value = "10000")]
    extend_ms: u64,

    /// Maximum number of jobs kept in the registry
    #[arg(long, default_value = "10000")]
    max_jobs: usize,

    /// How long shutdown waits for running jobs, in milliseconds
    #[arg(long, default_value = "0")]
    drain_timeout_ms: u64,

    /// File the registry is loaded from and flushed to
    #[arg(long, default_value = "data.json")]
    data_file: PathBuf,

    /// Output format for command replies
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

impl ServeArgs {
    fn service_config(&self) -> ServiceConfig {
        let scheduler = SchedulerConfig {
            worker_count: self.workers,
            scan_interval: Duration::from_millis(self.scan_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            default_job_duration: Duration::from_millis(self.job_duration_ms),
            extend_amount: Duration::from_millis(self.extend_ms),
            max_jobs: self.max_jobs,
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        };
        ServiceConfig::new(scheduler, self.data_file.clone())
    }
}

#[derive(Serialize)]
struct EvalOutput {
    expression: String,
    value: Option<f64>,
    result: Option<String>,
    error: Option<String>,
}

// =============================================================================
// Server Implementation
// =============================================================================

/// Read stdin on a dedicated thread so a pending read never blocks runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.service_config();
    tracing::info!(
        workers = config.scheduler.worker_count,
        scan_interval_ms = args.scan_interval_ms,
        heartbeat_interval_ms = args.heartbeat_interval_ms,
        job_duration_ms = args.job_duration_ms,
        data_file = %config.storage.data_path.display(),
        "Starting calc-lite"
    );

    let shutdown = install_shutdown_handler();
    let store = Arc::new(JsonFileStore::new(&config.storage.data_path));
    let service = CalcService::start(
        config.scheduler,
        Arc::new(ArithmeticEvaluator::new()),
        store,
        shutdown.clone(),
    )
    .await?;

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => {
                    tracing::info!("Input closed");
                    break;
                }
            },
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("Error: {msg}");
                continue;
            }
        };

        match console::execute(service.gateway(), command, args.output).await {
            Ok(Reply::Text(text)) => println!("{text}"),
            Ok(Reply::Quit) => break,
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    shutdown.cancel();
    service.shutdown().await?;
    Ok(())
}

// =============================================================================
// One-shot evaluation
// =============================================================================

fn run_eval(expression: &str, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = validate_expression(expression).and_then(|()| {
        ArithmeticEvaluator::new()
            .run(expression)
            .map_err(|e| e.to_string())
    });

    match output {
        OutputFormat::Json => {
            let out = EvalOutput {
                expression: expression.to_string(),
                value: outcome.as_ref().ok().copied(),
                result: outcome
                    .as_ref()
                    .ok()
                    .map(|v| format!("{} = {}", expression, format_value(*v))),
                error: outcome.as_ref().err().cloned(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => match &outcome {
            Ok(v) => println!("{} = {}", expression, format_value(*v)),
            Err(msg) => eprintln!("Error: {msg}"),
        },
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_server(serve_args).await?;
        }
        Commands::Eval { expression, output } => {
            run_eval(&expression, output)?;
        }
    }

    Ok(())
}
