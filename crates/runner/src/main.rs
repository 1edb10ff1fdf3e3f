//! velo-runner: connects to a velo server, runs the benchmarks it is handed
//! and reports the measurements back.

mod client;
mod error;
mod executor;
mod output;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use crate::client::{ClientConfig, RunnerClient};
use crate::executor::BenchExecutor;

// ── CLI ─────────────────────────────────────────────────────────────

/// Benchmark runner for a velo server.
#[derive(Parser, Debug)]
#[command(name = "velo-runner", version, about)]
struct Cli {
    /// Runner websocket endpoint of the server.
    #[arg(long, env = "VELO_SERVER_URL", default_value = "ws://127.0.0.1:7890/runner")]
    server_url: String,

    /// Name this runner registers under; must be unique per server.
    #[arg(long, env = "VELO_RUNNER_NAME")]
    name: String,

    /// Shared secret sent as a bearer token.
    #[arg(long, env = "VELO_RUNNER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Shell command that runs the benchmarks and prints JSON results.
    #[arg(long, env = "VELO_BENCH_COMMAND")]
    bench_command: String,

    /// Directory the benchmark command runs in.
    #[arg(long, env = "VELO_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Seconds between SIGTERM and SIGKILL when a benchmark is cancelled.
    #[arg(long, env = "VELO_FORCE_KILL_DELAY_SECS", default_value_t = 10)]
    force_kill_delay_secs: u64,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    velo_core::config::load_dotenv();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.work_dir)
        .with_context(|| format!("creating work dir {}", cli.work_dir.display()))?;
    info!(
        runner = %cli.name,
        server = %cli.server_url,
        work_dir = %cli.work_dir.display(),
        "velo-runner starting"
    );

    let executor = BenchExecutor::new(
        cli.bench_command,
        cli.work_dir,
        Duration::from_secs(cli.force_kill_delay_secs),
    );
    let config = ClientConfig {
        server_url: cli.server_url,
        name: cli.name,
        token: cli.token,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        // The client may already be gone.
        let _ = shutdown_tx.send(true);
    });

    RunnerClient::new(config, executor, shutdown_rx).run().await;

    info!("velo-runner exited cleanly");
    Ok(())
}
