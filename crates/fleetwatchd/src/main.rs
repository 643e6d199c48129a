//! fleetwatchd — runs the fleet monitor described by a fleetwatch.toml.
//!
//! # Usage
//!
//! ```text
//! fleetwatchd run --config fleetwatch.toml [--json-logs]
//! fleetwatchd check-config --config fleetwatch.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetwatch_core::FleetConfig;
use fleetwatchd::FleetContext;

const DEFAULT_FILTER: &str = "info,fleetwatch=debug";

#[derive(Parser)]
#[command(name = "fleetwatchd", about = "Fleet health, metrics, and lifecycle monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor until interrupted.
    Run {
        /// Path to fleetwatch.toml.
        #[arg(long)]
        config: PathBuf,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        /// Path to fleetwatch.toml.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, json_logs } => {
            init_tracing(json_logs);
            run(&config).await
        }
        Command::CheckConfig { config } => {
            init_tracing(false);
            check_config(&config)
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(path: &Path) -> anyhow::Result<FleetConfig> {
    FleetConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    info!(path = %path.display(), workers = config.workers.len(), "config is valid");
    for worker in &config.workers {
        println!(
            "{}\t{}{}\tauto_start={}",
            worker.name, worker.address, worker.health_path, worker.auto_start
        );
    }
    Ok(())
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    info!(path = %path.display(), "fleetwatchd starting");

    let mut context = FleetContext::build(&config)?;
    context.spawn();

    let records = context
        .fleet()
        .register_workers(&config.workers)
        .await
        .context("registering workers")?;
    info!(workers = records.len(), "workers registered");

    tokio::signal::ctrl_c()
        .await
        .context("installing ctrl-c handler")?;
    info!("shutdown signal received");

    let overview = context.fleet().registry.get_system_overview().await;
    info!(
        total_workers = overview.total_workers,
        total_requests = overview.total_requests,
        "final fleet overview"
    );

    context.shutdown().await;
    info!("fleetwatchd stopped");
    Ok(())
}
