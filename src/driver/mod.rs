//! C6: the per-batch driver. Runs as its own subprocess (exec'd by C5, or
//! by C3 in the HTTP path), reads `JOB_INPUT` from the environment,
//! processes items sequentially, and emits progress beacons on stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collaborators::{ObjectStore, SourceTable};
use crate::domain::WorkItem;

/// One extracted frame, ready for upload. `frame_second` carries the
/// two-decimal precision the object-store key format requires (§6).
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub frame_number: u32,
    pub frame_second: f64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub frames: Vec<FrameOutput>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineRunError {
    #[error("media pipeline failed: {0}")]
    Failed(String),
}

/// The in-process media pipeline, treated as an external collaborator with
/// a well-defined contract (§4.6 expansion): border-crop, scene framing,
/// dedup, and CLIP embedding all live on the other side of this trait and
/// are permanently out of scope here. Implementations also upsert
/// embeddings to the vector store as a side effect of a successful run.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    async fn run(&self, local_path: &Path, platform: &str, code: &str) -> Result<PipelineOutput, PipelineRunError>;
}

/// The one shipped implementation: execs `pipeline_entrypoint` per item and
/// treats its stdout as opaque, mirroring the relationship between the
/// original driver and its `VideoPipeline` collaborator class rather than
/// reimplementing any of the actual video-processing logic.
pub struct SubprocessMediaPipeline {
    pub command: String,
}

#[async_trait]
impl MediaPipeline for SubprocessMediaPipeline {
    async fn run(&self, local_path: &Path, platform: &str, code: &str) -> Result<PipelineOutput, PipelineRunError> {
        let output = tokio::process::Command::new(&self.command)
            .arg(local_path)
            .env("PIPELINE_PLATFORM", platform)
            .env("PIPELINE_CODE", code)
            .output()
            .await
            .map_err(|err| PipelineRunError::Failed(err.to_string()))?;

        if !output.status.success() {
            return Err(PipelineRunError::Failed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let manifest: PipelineManifest = serde_json::from_slice(&output.stdout)
            .map_err(|err| PipelineRunError::Failed(format!("invalid pipeline manifest: {err}")))?;

        let mut frames = Vec::with_capacity(manifest.frames.len());
        for frame in manifest.frames {
            let bytes = tokio::fs::read(&frame.path)
                .await
                .map_err(|err| PipelineRunError::Failed(err.to_string()))?;
            frames.push(FrameOutput {
                frame_number: frame.frame_number,
                frame_second: frame.frame_second,
                bytes,
            });
        }
        Ok(PipelineOutput { frames })
    }
}

#[derive(Debug, Deserialize)]
struct PipelineManifest {
    frames: Vec<PipelineManifestFrame>,
}

#[derive(Debug, Deserialize)]
struct PipelineManifestFrame {
    frame_number: u32,
    frame_second: f64,
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Beacon {
    item_done: u64,
}

pub struct DriverContext {
    pub workdir: PathBuf,
    pub videos_bucket: String,
    pub frames_bucket: String,
    pub pipeline: Arc<dyn MediaPipeline>,
    pub object_store: Arc<dyn ObjectStore>,
    pub source_table: Arc<dyn SourceTable>,
}

/// Runs every item in `items` sequentially, writing beacon/log lines to
/// `stdout` and `stderr` as it goes. Returns the process exit code (0 iff
/// every item succeeded).
pub async fn run_batch(items: &[WorkItem], ctx: &DriverContext, mut stdout: impl Write, mut stderr: impl Write) -> i32 {
    let mut done: u64 = 0;
    let mut any_failed = false;

    for item in items {
        match process_item(item, ctx).await {
            Ok(()) => {
                done += 1;
                let _ = writeln!(stdout, "{}", serde_json::to_string(&Beacon { item_done: done }).unwrap());
                let _ = stdout.flush();
            }
            Err(reason) => {
                any_failed = true;
                let _ = ctx.source_table.record_error(&item.code, &reason).await;
                let _ = writeln!(stderr, "ERROR processing {}/{}: {reason}", item.platform, item.code);
            }
        }
    }

    if any_failed { 1 } else { 0 }
}

async fn process_item(item: &WorkItem, ctx: &DriverContext) -> Result<(), String> {
    let local_path = ctx.workdir.join(&item.platform).join(&item.code).join("video.mp4");

    if !local_path.exists() {
        if let Some(parent) = local_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let key = format!("{}/{}/video.mp4", item.platform, item.code);
        ctx.object_store
            .download(&ctx.videos_bucket, &key, &local_path)
            .await
            .map_err(|err| format!("download failed: {err}"))?;
    }

    let output = ctx
        .pipeline
        .run(&local_path, &item.platform, &item.code)
        .await
        .map_err(|err| err.to_string())?;

    for frame in &output.frames {
        let key = format!(
            "{}/{}/{}_{:.2}.png",
            item.platform, item.code, frame.frame_number, frame.frame_second
        );
        ctx.object_store
            .upload(&ctx.frames_bucket, &key, frame.bytes.clone())
            .await
            .map_err(|err| format!("frame upload failed: {err}"))?;
    }

    // Committed before the next item runs, giving a partial batch its
    // idempotency: a re-run skips already-extracted rows (§7).
    if let Some(id) = ctx
        .source_table
        .id_for_code(&item.code)
        .await
        .map_err(|err| format!("id lookup failed: {err}"))?
    {
        ctx.source_table
            .mark_extracted(&[id])
            .await
            .map_err(|err| format!("mark_extracted failed: {err}"))?;
    }

    Ok(())
}
