//! C3: spawns the extraction subprocess for one job, streams its stdout
//! line-by-line without waiting for EOF, parses progress beacons, and
//! drives the job through its terminal status. Never retries internally —
//! retries belong to C5 or the HTTP client.

pub mod beacon;

use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::concurrency::JobOutcome;
use crate::domain::{ItemStatus, JobId, JobPatch, JobStatus, LogEntry, WorkItem};
use crate::store::JobStore;

#[derive(Serialize)]
struct JobInputItem<'a> {
    platform: &'a str,
    code: &'a str,
}

/// Runs one job to completion against the configured extraction subprocess.
/// This is the `job_fn` that C2's dispatcher awaits; it owns every C1 patch
/// for this job from `PENDING` through its terminal status.
pub async fn run_job(
    store: Arc<JobStore>,
    job_id: JobId,
    items: Vec<WorkItem>,
    command: String,
    debug_pipeline: bool,
) -> JobOutcome {
    store.update(job_id, JobPatch::new().with_status(JobStatus::Pending).with_log(LogEntry::info("queued")));
    store.update(job_id, JobPatch::new().with_status(JobStatus::Running).with_log(LogEntry::info("started")));

    let total_items = items.len() as i64;
    let job_input: Vec<JobInputItem<'_>> = items
        .iter()
        .map(|item| JobInputItem {
            platform: &item.platform,
            code: &item.code,
        })
        .collect();
    let job_input_json = match serde_json::to_string(&job_input) {
        Ok(json) => json,
        Err(err) => {
            store.update(
                job_id,
                JobPatch::new()
                    .with_status(JobStatus::Failed)
                    .with_log(LogEntry::error(format!("failed to encode JOB_INPUT: {err}"))),
            );
            return JobOutcome { exit_code: -1 };
        }
    };

    // Invoked through a shell so `pipeline_entrypoint` can be either a bare
    // executable name or a full command line (tests exercise it with
    // inline `/bin/sh -c '...'` scripts).
    let mut command_proc = Command::new("sh");
    command_proc
        .arg("-c")
        .arg(&command)
        .env("JOB_INPUT", job_input_json)
        .env("DEBUG_PIPELINE", if debug_pipeline { "1" } else { "0" })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());

    let mut child = match command_proc.spawn() {
        Ok(child) => child,
        Err(err) => {
            store.update(
                job_id,
                JobPatch::new()
                    .with_status(JobStatus::Failed)
                    .with_log(LogEntry::error(format!("failed to spawn extraction subprocess: {err}"))),
            );
            return JobOutcome { exit_code: -1 };
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let mut prev_done: i64 = 0;
    let mut checkmark_total: i64 = 0;
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        store.update(job_id, JobPatch::new().with_log(LogEntry::info(line.clone())));
        if debug_pipeline {
            tracing::info!(job_id = %job_id, line = %line, "child stdout (debug_pipeline)");
        }

        let observation = beacon::observe_line(&line, checkmark_total);
        checkmark_total = observation.checkmark_total;
        if observation.done > prev_done {
            let current_progress = store.get(job_id).map(|job| job.progress).unwrap_or(0);
            let delta = beacon::progress_delta(prev_done, observation.done, total_items, current_progress);
            let mut patch = JobPatch::new().with_item_status_range(
                prev_done.max(0) as usize,
                observation.done.max(0) as usize,
                ItemStatus::Success,
            );
            if delta > 0 {
                patch = patch.with_progress_delta(delta);
            }
            store.update(job_id, patch);
            prev_done = observation.done;
        }
    }

    let mut stderr_buf = String::new();
    let _ = stderr.read_to_string(&mut stderr_buf).await;
    if !stderr_buf.trim().is_empty() {
        for line in stderr_buf.lines() {
            store.update(job_id, JobPatch::new().with_log(LogEntry::error(line.to_string())));
        }
    }

    let status = child.wait().await;
    let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);

    if exit_code == 0 {
        let current_progress = store.get(job_id).map(|job| job.progress).unwrap_or(0);
        let remaining = 100u32.saturating_sub(current_progress as u32);
        let mut patch = JobPatch::new()
            .with_status(JobStatus::Completed)
            .with_log(LogEntry::info("completed"))
            .with_item_status_range(0, items.len(), ItemStatus::Success);
        if remaining > 0 {
            patch = patch.with_progress_delta(remaining);
        }
        store.update(job_id, patch);
    } else {
        let tail = stderr_buf.lines().last().unwrap_or("");
        store.update(
            job_id,
            JobPatch::new()
                .with_status(JobStatus::Failed)
                .with_log(LogEntry::error(format!("exit code {exit_code}: {tail}")))
                .with_item_status_range(prev_done.max(0) as usize, items.len(), ItemStatus::Failed),
        );
    }

    JobOutcome { exit_code }
}
