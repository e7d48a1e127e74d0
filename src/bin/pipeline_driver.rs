//! C6 entrypoint: the per-batch driver. Exec'd by C5 (and, via the HTTP
//! path, effectively by C3) with its work list passed through `JOB_INPUT`.
//! Processes items sequentially, emitting one progress beacon per completed
//! item on stdout, and exits non-zero iff any item failed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use extract_ctl::collaborators::object_store::S3ObjectStore;
use extract_ctl::collaborators::source_table::PgSourceTable;
use extract_ctl::config::AppConfig;
use extract_ctl::domain::WorkItem;
use extract_ctl::driver::{self, DriverContext, SubprocessMediaPipeline};

#[derive(Debug, Deserialize)]
struct JobInputItem {
    platform: String,
    code: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = AppConfig::load(None)?;

    let job_input_json = std::env::var("JOB_INPUT").context("JOB_INPUT environment variable is required")?;
    let job_input: Vec<JobInputItem> = serde_json::from_str(&job_input_json).context("JOB_INPUT is not valid JSON")?;
    let items: Vec<WorkItem> = job_input
        .into_iter()
        .map(|item| WorkItem::new(item.platform, item.code))
        .collect();

    let database_url = config.database_url.clone().context("DATABASE_URL must be set for the pipeline driver")?;
    let source_table = Arc::new(PgSourceTable::connect(&database_url).await?);
    let object_store = Arc::new(S3ObjectStore::connect(config.aws_region.clone()).await);

    let workdir = std::env::temp_dir().join(format!("extract-ctl-{}", std::process::id()));
    tokio::fs::create_dir_all(&workdir).await?;

    let ctx = DriverContext {
        workdir,
        videos_bucket: config.videos_bucket.clone(),
        frames_bucket: config.frames_bucket.clone(),
        pipeline: Arc::new(SubprocessMediaPipeline {
            command: std::env::var("MEDIA_PIPELINE_COMMAND").unwrap_or_else(|_| "media-pipeline".to_string()),
        }),
        object_store,
        source_table,
    };

    let exit_code = driver::run_batch(&items, &ctx, std::io::stdout(), std::io::stderr()).await;
    std::process::exit(exit_code);
}
