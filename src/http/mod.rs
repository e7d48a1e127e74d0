//! C4: the HTTP surface. A thin axum router over C1/C2 — handlers never
//! touch a subprocess or a blocking call directly; they create/read jobs and
//! hand invocation off to the concurrency manager.

pub mod dto;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::concurrency::ConcurrencyManager;
use crate::config::AppConfig;
use crate::store::JobStore;

pub struct AppState {
    pub job_store: Arc<JobStore>,
    pub concurrency: Arc<ConcurrencyManager>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/process", post(handlers::process))
        .route("/status/{job_id}", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::config))
        .fallback(handlers::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves the router until `token` is cancelled, then waits for
/// in-flight requests to finish (axum's graceful shutdown).
pub async fn serve(addr: SocketAddr, state: Arc<AppState>, token: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "api-server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            token.cancelled().await;
            tracing::info!("api-server shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            job_store: Arc::new(JobStore::new()),
            concurrency: ConcurrencyManager::start(1),
            config: Arc::new(AppConfig::default()),
        })
    }

    #[tokio::test]
    async fn process_rejects_oversize_request_with_400() {
        let mut config = AppConfig::default();
        config.max_videos_per_request = 1;
        let state = Arc::new(AppState {
            job_store: Arc::new(JobStore::new()),
            concurrency: ConcurrencyManager::start(1),
            config: Arc::new(config),
        });

        let body = serde_json::json!({"items": [
            {"platform": "instagram", "code": "A"},
            {"platform": "instagram", "code": "B"},
        ]});
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/process")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_on_unknown_job_is_404() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri(format!("/status/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_on_malformed_id_is_404() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri("/status/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn process_accepted_then_status_observes_job_never_absent() {
        let state = state();
        let body = serde_json::json!({"items": [{"platform": "instagram", "code": "A"}]});
        let response = router(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/process")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: dto::ProcessResponse = serde_json::from_slice(&bytes).unwrap();

        let status_response = router(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/status/{}", parsed.job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(status_response.status(), StatusCode::OK);
    }
}
