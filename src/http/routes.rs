use crate::config::OutputFormat;
use crate::error::{Result, ServiceError};
use crate::http::state::AppState;
use crate::orchestrator::JobOrchestrator;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/status/:job_id", get(status))
        .route("/result/:job_id", get(result))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::http::auth::require_api_key,
        ))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct StatusResponse {
    exists: bool,
    processing: bool,
    completed: bool,
}

async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let completed = state.config.output_dir.join(&job_id).exists();
    let processing = !completed && state.config.temp_dir.join(format!("job_{job_id}")).exists();
    Json(StatusResponse {
        exists: completed || processing,
        processing,
        completed,
    })
}

#[derive(Serialize)]
struct TranscribeAccepted {
    job_id: String,
}

async fn transcribe(State(state): State<AppState>, multipart: Multipart) -> Response {
    match handle_transcribe(state, multipart).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Validates and stashes the upload, then hands the job off to a spawned
/// task and returns the job id immediately: callers poll `/status/{job_id}`
/// and fetch `/result/{job_id}` once it reports `completed`, rather than
/// holding the connection open for the whole pipeline.
async fn handle_transcribe(state: AppState, mut multipart: Multipart) -> Result<Response> {
    let permit = state
        .job_admission
        .clone()
        .try_acquire_owned()
        .map_err(|_| ServiceError::JobFailed("server at capacity, try again shortly".to_string()))?;

    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut speed_factor = state.config.default_speed_factor;
    let mut format = OutputFormat::Json;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("audio") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::BadRequest(format!("failed to read audio field: {e}")))?;
                audio_bytes = Some(bytes.to_vec());
            }
            Some("speed") => {
                let text = field.text().await.unwrap_or_default();
                if let Ok(v) = text.parse::<f64>() {
                    speed_factor = v.clamp(1.0, 3.0);
                }
            }
            Some("format") => {
                let text = field.text().await.unwrap_or_default();
                if let Ok(parsed) = OutputFormat::from_str(&text) {
                    format = parsed;
                }
            }
            _ => {}
        }
    }

    let audio_bytes =
        audio_bytes.ok_or_else(|| ServiceError::BadRequest("missing 'audio' field".to_string()))?;
    if audio_bytes.is_empty() {
        return Err(ServiceError::BadRequest("audio file is empty".to_string()));
    }
    let max_bytes = state.config.max_file_size_bytes();
    if audio_bytes.len() as u64 > max_bytes {
        return Err(ServiceError::FileTooLarge(audio_bytes.len() as u64, max_bytes));
    }

    tokio::fs::create_dir_all(&state.config.temp_dir).await?;
    let job_id = Uuid::new_v4();
    let input_path = state
        .config
        .temp_dir
        .join(format!("upload_{job_id}.bin"));
    tokio::fs::write(&input_path, &audio_bytes).await?;

    let orchestrator = JobOrchestrator::new(Arc::clone(&state.config), Arc::clone(&state.transcriber));
    let cancellation = CancellationToken::new();

    tokio::spawn(async move {
        let outcome = orchestrator
            .run(job_id, &input_path, speed_factor, format, cancellation)
            .await;
        tokio::fs::remove_file(&input_path).await.ok();
        drop(permit);
        if let Err(e) = outcome {
            tracing::error!(job_id = %job_id, error = %e, "background job failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TranscribeAccepted {
            job_id: job_id.to_string(),
        }),
    )
        .into_response())
}

/// Serves back whichever artifact the completed job wrote under
/// `OUTPUT_DIR/{job_id}/`, preferring the structured JSON body when present.
async fn result(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Response> {
    let job_dir = state.config.output_dir.join(&job_id);
    if !job_dir.exists() {
        return Err(ServiceError::JobNotFound(job_id));
    }

    for (file_name, content_type) in [
        ("transcript.json", "application/json"),
        ("transcript.srt", "application/x-subrip"),
        ("transcript.txt", "text/plain"),
    ] {
        let path = job_dir.join(file_name);
        if path.exists() {
            let body = tokio::fs::read(&path).await?;
            return Ok((StatusCode::OK, [("content-type", content_type)], body).into_response());
        }
    }

    Err(ServiceError::JobNotFound(job_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_serializes() {
        let response = StatusResponse {
            exists: true,
            processing: false,
            completed: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"exists\":true"));
        assert!(json.contains("\"completed\":true"));
    }
}
