//! C4 entrypoint: the HTTP control plane. Loads config, starts C1/C2, and
//! serves the router until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use extract_ctl::concurrency::ConcurrencyManager;
use extract_ctl::config::AppConfig;
use extract_ctl::http::{self, AppState};
use extract_ctl::store::JobStore;

#[derive(Parser, Debug)]
#[clap(name = "api-server", about = "HTTP control plane for video extraction jobs")]
struct Cli {
    /// Optional JSON settings file, overlaid on top of the built-in defaults
    /// and overridden in turn by environment variables.
    #[clap(long, env = "SETTINGS_FILE")]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load(cli.settings.as_ref())?);
    tracing::info!(?config, "loaded configuration");

    let state = Arc::new(AppState {
        job_store: Arc::new(JobStore::new()),
        concurrency: ConcurrencyManager::start(config.max_parallel_jobs),
        config: Arc::clone(&config),
    });

    let token = CancellationToken::new();
    shutdown_signal_listener(token.clone());

    let addr = config.bind_socket_addr()?;
    http::serve(addr, state, token).await
}

fn shutdown_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate()).expect("cannot listen to SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("CTRL+C received, shutting down"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
        };
        token.cancel();
    });
}
