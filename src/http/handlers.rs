use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use crate::domain::WorkItem;
use crate::error::ApiError;
use crate::http::dto::{
    HealthResponse, ProcessRequest, ProcessResponse, StatusQuery, StatusResponse,
};
use crate::http::AppState;
use crate::runner;

pub async fn process(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> Result<(StatusCode, Json<ProcessResponse>), ApiError> {
    if request.items.is_empty() || request.items.len() > state.config.max_videos_per_request {
        return Err(ApiError::BadRequest(format!(
            "request exceeds maximum allowed videos per request: {}",
            state.config.max_videos_per_request
        )));
    }

    let items: Vec<WorkItem> = request
        .items
        .into_iter()
        .map(|item| WorkItem::new(item.platform, item.code))
        .collect();

    let job = state.job_store.create(items.clone());

    let store = Arc::clone(&state.job_store);
    let job_id = job.id;
    let command = state.config.pipeline_entrypoint.clone();
    let debug_pipeline = state.config.debug_pipeline;
    state
        .concurrency
        .submit(async move { runner::run_job(store, job_id, items, command, debug_pipeline).await })
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("concurrency manager is shut down")))?;

    Ok((StatusCode::ACCEPTED, Json(ProcessResponse { job_id: job.id })))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job_id: uuid::Uuid = job_id.parse().map_err(|_| ApiError::NotFound)?;
    let job = state.job_store.get(job_id).ok_or(ApiError::NotFound)?;
    Ok(Json(StatusResponse::from_job(&job, query.tail)))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn config(State(state): State<Arc<AppState>>) -> Json<crate::config::RedactedConfig> {
    Json(state.config.redacted())
}

pub async fn fallback() -> ApiError {
    ApiError::NotFound
}
