use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error taxonomy shared by the batch orchestrator, driver and verifier.
/// Not every caller cares about the distinction; match on the variant only
/// where control flow actually depends on the kind (e.g. "is this
/// retryable"), otherwise propagate with `anyhow::Context`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient I/O error: {source}")]
    TransientIo {
        #[source]
        source: anyhow::Error,
    },

    #[error("item {code} failed: {reason}")]
    ItemFailure { code: String, reason: String },

    #[error("batch failed with exit code {exit_code}")]
    BatchFailure { exit_code: i32 },

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn transient(source: impl Into<anyhow::Error>) -> Self {
        PipelineError::TransientIo {
            source: source.into(),
        }
    }

    pub fn item(code: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::ItemFailure {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP-boundary error type (C4 only). Internal `PipelineError`s collapse to
/// `Internal`; only `Validation` gets a dedicated 4xx mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
