use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("media transform failed: {0}")]
    MediaTransform(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("external API error: {0}")]
    Api(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes (max {1} bytes)")]
    FileTooLarge(u64, u64),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    correlation_id: String,
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::UnsupportedFormat(_)
            | ServiceError::FileTooLarge(..)
            | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Validation(_) | ServiceError::MediaTransform(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::JobNotFound(_) | ServiceError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Transcription(_)
            | ServiceError::Api(_)
            | ServiceError::JobFailed(_)
            | ServiceError::Config(_)
            | ServiceError::Io(_)
            | ServiceError::Http(_)
            | ServiceError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Converts a service error into an HTTP response carrying a freshly-minted
/// correlation id, logged alongside the error before the response is built.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(correlation_id = %correlation_id, error = %self, "request failed");
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            correlation_id,
        };
        (status, Json(body)).into_response()
    }
}
