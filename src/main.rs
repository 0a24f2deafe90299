use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use devstress::config::{parse_size, LoggingConfig, StressConfig};
use devstress::harness::report::render_text;
use devstress::harness::QuotaMode;
use devstress::smoke::{self, SmokeMode, SmokeResult};
use devstress::target::DeviceTarget;

#[derive(Parser)]
#[command(
    name = "devstress",
    about = "Concurrent write stress harness for character devices",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $DEVSTRESS_CONFIG, then /etc/devstress/devstress.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run concurrent writers against one device and report per-worker results
    Stress {
        /// Device path shared by all workers
        #[arg(long)]
        target: Option<String>,

        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Bytes each worker writes (accepts K/M/G suffixes)
        #[arg(long, value_parser = parse_size)]
        bytes_per_worker: Option<u64>,

        /// Bytes per write call (accepts K/M/G suffixes)
        #[arg(long, value_parser = parse_size)]
        chunk_size: Option<u64>,

        /// Truncate the final write so each worker writes exactly its quota
        #[arg(long)]
        exact: bool,

        /// Stop waiting for workers after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Single write and/or read against the device
    Smoke {
        /// Device path
        #[arg(long)]
        target: Option<String>,

        /// Which checks to run: write, read or both
        #[arg(long, default_value = "both")]
        mode: SmokeMode,
    },

    /// Open the device for writing and close it again
    OpenCheck {
        /// Device path
        #[arg(long)]
        target: Option<String>,
    },
}

fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

// Logs go to stderr so that `--json` output on stdout stays parseable.
fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if force_json || logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_smoke_results(results: &[SmokeResult]) {
    println!("{:<10} | {:<6} | Details", "Check", "Status");
    println!("{:-<10}-|-{:-<6}-|-{:-<40}", "", "", "");
    for res in results {
        println!("{:<10} | {:<6} | {}", res.check, res.status.to_string(), res.details);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The configured subscriber depends on the config itself, so loading runs
    // under a scoped stderr subscriber to keep its fallback warnings visible.
    let mut config = tracing::subscriber::with_default(bootstrap_subscriber(), || match &cli.config {
        Some(path) => StressConfig::load(path),
        None => Ok(StressConfig::load_or_default()),
    })?;

    init_tracing(&config.logging, cli.log_json);

    match cli.command {
        Commands::Stress {
            target,
            workers,
            bytes_per_worker,
            chunk_size,
            exact,
            timeout,
            json,
        } => {
            let harness = &mut config.harness;
            if let Some(t) = target {
                harness.target = t;
            }
            if let Some(w) = workers {
                harness.workers = w;
            }
            if let Some(b) = bytes_per_worker {
                harness.bytes_per_worker = b;
            }
            if let Some(c) = chunk_size {
                harness.chunk_size = usize::try_from(c)?;
            }
            if exact {
                harness.quota_mode = QuotaMode::Exact;
            }
            if timeout.is_some() {
                harness.timeout_secs = timeout;
            }

            tracing::info!(
                device = %harness.target,
                workers = harness.workers,
                "Running stress test"
            );
            let report = devstress::run_stress(harness).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_text(&report));
            }
        }
        Commands::Smoke { target, mode } => {
            let path = target.unwrap_or(config.harness.target);
            let results = smoke::run(&DeviceTarget::new(path), mode);
            print_smoke_results(&results);
        }
        Commands::OpenCheck { target } => {
            let path = target.unwrap_or(config.harness.target);
            let result = smoke::check_open(&DeviceTarget::new(path));
            print_smoke_results(std::slice::from_ref(&result));
        }
    }

    Ok(())
}
