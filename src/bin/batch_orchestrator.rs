//! C5 entrypoint: the long-lived batch-orchestrator process. Walks the
//! source table to completion, spawning the per-batch driver (C6) for each
//! batch, then exits with the code described in §6.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

use extract_ctl::collaborators::source_table::PgSourceTable;
use extract_ctl::collaborators::vector_store::QdrantVectorStore;
use extract_ctl::config::AppConfig;
use extract_ctl::orchestrator::BatchOrchestrator;

#[derive(Parser, Debug)]
#[clap(name = "batch-orchestrator", about = "Walks the source table and drives extraction to completion")]
struct Cli {
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

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set for the batch orchestrator")?;
    let source_table = Arc::new(PgSourceTable::connect(&database_url).await?);
    let vector_store = Arc::new(QdrantVectorStore::connect(&config.qdrant_url, config.qdrant_api_key.as_deref())?);

    let token = CancellationToken::new();
    shutdown_signal_listener(token.clone());

    let orchestrator = BatchOrchestrator::new(config, source_table, vector_store);
    let exit_code = orchestrator.run(token).await?;
    std::process::exit(exit_code);
}

fn shutdown_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate()).expect("cannot listen to SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("CTRL+C received, finishing current batch then stopping"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received, finishing current batch then stopping"),
        };
        token.cancel();
    });
}
