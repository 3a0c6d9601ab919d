//! surgectl — adaptive load-test ramp controller.
//!
//! Steps a Locust swarm's target concurrency against a service while
//! checking service-level objectives in Prometheus on every tick, and
//! stops the ramp the moment an objective is breached.
//!
//! # Usage
//!
//! ```text
//! surgectl --step 10 --ceiling 100 --tick-secs 20
//! ```
//!
//! Endpoints come from the environment (`LOCUST_HOST`/`LOCUST_PORT`,
//! `PROMETHEUS_HOST`/`PROMETHEUS_PORT`); flags override the remaining
//! `SURGE_*` variables.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use surge_controller::{RampController, RampPlan};
use surge_core::{config, RampConfig, RunOutcome};
use surge_loadgen::SwarmCommander;
use surge_metrics::PrometheusClient;

/// Exit codes for automation consuming this tool. Zero is reserved for
/// a ceiling reached with every objective intact.
const EXIT_BREACH: u8 = 2;
const EXIT_INTERRUPTED: u8 = 3;

#[derive(Parser)]
#[command(name = "surgectl", about = "Adaptive load-test ramp controller")]
struct Cli {
    /// TOML file with [[objective]] entries; the built-in response-time
    /// objective is used when omitted.
    #[arg(long)]
    objectives: Option<PathBuf>,

    /// Users added per passing tick.
    #[arg(long)]
    step: Option<u32>,

    /// User count that ends the run.
    #[arg(long)]
    ceiling: Option<u32>,

    /// Seconds between ramp decisions.
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Seconds each step is spread over (spawn rate = step / this).
    #[arg(long)]
    spawn_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,surge=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(RunOutcome::CeilingReached) => {
            info!("ceiling reached with all objectives intact");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::SloBreached) => {
            error!("run stopped on objective breach");
            ExitCode::from(EXIT_BREACH)
        }
        Ok(RunOutcome::Interrupted) => {
            warn!("run interrupted by operator");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            error!(error = %e, "ramp controller failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunOutcome> {
    let mut config = RampConfig::from_env()?;
    if let Some(path) = &cli.objectives {
        config.objectives = config::load_objectives(path)?;
    }
    if let Some(step) = cli.step {
        config.step = step;
    }
    if let Some(ceiling) = cli.ceiling {
        config.ceiling = ceiling;
    }
    if let Some(tick_secs) = cli.tick_secs {
        config.tick_interval = std::time::Duration::from_secs(tick_secs);
    }
    if let Some(spawn_secs) = cli.spawn_secs {
        config.spawn_secs = spawn_secs;
    }
    config.validate()?;

    info!(
        prometheus = %config.prometheus_address,
        locust = %config.swarm_address,
        step = config.step,
        ceiling = config.ceiling,
        spawn_rate = config.spawn_rate(),
        objectives = config.objectives.len(),
        "configuration resolved"
    );

    let source = PrometheusClient::new(&config.prometheus_address, config.query_timeout);
    let commander = SwarmCommander::new(&config.swarm_address);

    // Ctrl-C forces the ramp-down path before exit; leaving the
    // generator swarming after the controller dies leaks load into the
    // target environment.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let plan = RampPlan::from(&config);
    let mut controller =
        RampController::new(plan, config.objectives.clone(), source, commander);
    Ok(controller.run(shutdown_rx).await?)
}
