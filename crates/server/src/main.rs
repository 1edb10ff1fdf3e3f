//! velo-server: accepts runner connections and benchmark submissions,
//! dispatches work and reports significant performance changes.

mod api;
mod results;
mod router;
mod runner_ws;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use velo_core::Config;
use velo_dispatch::{
    Dispatcher, JsonFileTaskStore, MemoryRunHistory, MemoryTaskStore, TaskQueue, TaskStore,
};
use velo_notify::{Dispatcher as NotifyDispatcher, LogNotifier, Notifier, TemplateRenderer, WebhookNotifier};

use crate::results::{ChannelSink, ResultPipeline};
use crate::state::AppState;

// ── CLI ─────────────────────────────────────────────────────────────

/// Continuous benchmarking server.
#[derive(Parser, Debug)]
#[command(name = "velo-server", version, about)]
struct Cli {
    /// Config profile; every key is looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "VELO_PROFILE")]
    profile: Option<String>,

    /// Override the listen port from the environment config.
    #[arg(long)]
    port: Option<u16>,
}

fn load_config(cli: &Cli) -> Config {
    velo_core::config::load_dotenv();
    let mut config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
}

fn build_notifier(config: &Config) -> anyhow::Result<NotifyDispatcher> {
    let channel: Box<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url)?),
        None => {
            info!("no WEBHOOK_URL configured, reports will only be logged");
            Box::new(LogNotifier)
        }
    };
    Ok(NotifyDispatcher::new(vec![channel]))
}

fn build_renderer(config: &Config) -> anyhow::Result<TemplateRenderer> {
    Ok(match &config.notify.template {
        Some(template) => TemplateRenderer::with_body_template(template.clone())?,
        None => TemplateRenderer::new(),
    })
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

    let cli = Cli::parse();
    let config = load_config(&cli);
    config.log_summary();

    let store: Arc<dyn TaskStore> = match &config.dispatch.queue_file {
        Some(path) => Arc::new(JsonFileTaskStore::open(path)?),
        None => Arc::new(MemoryTaskStore::new()),
    };
    let queue = TaskQueue::new(store)?;
    info!(pending = queue.pending_len(), "task queue restored");

    let (sink, results_rx) = ChannelSink::new();
    let mut dispatcher = Dispatcher::new(queue, Arc::new(sink)).with_heartbeat_timeout(
        Duration::from_secs(config.dispatch.heartbeat_timeout_secs),
    );
    if let Some(commit) = &config.dispatch.bench_repo_commit {
        dispatcher = dispatcher.with_bench_repo_commit(commit.clone());
    }
    let dispatcher = Arc::new(dispatcher);

    let pipeline = ResultPipeline::new(
        Arc::new(MemoryRunHistory::new()),
        &config.analysis,
        build_renderer(&config)?,
    );
    let notifier = build_notifier(&config)?;
    let ingestion = tokio::spawn(pipeline.run(results_rx, notifier));

    let state = Arc::new(AppState {
        dispatcher: Arc::clone(&dispatcher),
        runner_token: config.dispatch.runner_token.clone(),
    });
    let app = router::build_router(state);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Closing every runner drops the last result sink with the dispatcher,
    // which lets the ingestion task drain and finish.
    tokio::task::spawn_blocking(move || {
        dispatcher.shutdown();
        drop(dispatcher);
    })
    .await?;
    if tokio::time::timeout(Duration::from_secs(5), ingestion).await.is_err() {
        tracing::warn!("result pipeline did not drain in time");
    }

    info!("velo-server exited cleanly");
    Ok(())
}
