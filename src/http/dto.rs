use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Job, JobStatus};

#[derive(Debug, Deserialize)]
pub struct ProcessRequestItem {
    pub platform: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub items: Vec<ProcessRequestItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub tail: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub platform: String,
    pub code: String,
    pub item_status: String,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub ts: DateTime<Utc>,
    pub level: String,
    pub msg: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub items: Vec<ItemResponse>,
    pub logs: Vec<LogResponse>,
}

impl StatusResponse {
    /// `tail`: absent or non-positive means "all logs", matching the HTTP
    /// contract's `tail=N` query parameter.
    pub fn from_job(job: &Job, tail: Option<i64>) -> Self {
        let tail_n = tail.filter(|n| *n > 0).map(|n| n as usize).unwrap_or(0);
        Self {
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
            items: job
                .items
                .iter()
                .map(|item| ItemResponse {
                    platform: item.platform.clone(),
                    code: item.code.clone(),
                    item_status: format!("{:?}", item.item_status).to_lowercase(),
                })
                .collect(),
            logs: job
                .tail_logs(tail_n)
                .iter()
                .map(|log| LogResponse {
                    ts: log.ts,
                    level: format!("{:?}", log.level).to_uppercase(),
                    msg: log.msg.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
