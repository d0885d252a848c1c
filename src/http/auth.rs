use crate::error::ServiceError;
use crate::http::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

const API_KEY_HEADER: &str = "x-api-key";
const AUTH_HEADER: &str = "authorization";

/// Checks `X-API-Key` or `Authorization: Bearer <secret>` against the
/// configured secret, grounded on the `porua` reference server's
/// `middleware::from_fn_with_state` auth layer. When no secret is
/// configured, auth is a no-op (useful for local development).
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = &state.config.auth_secret else {
        return Ok(next.run(request).await);
    };

    if header_matches(request.headers(), expected) {
        Ok(next.run(request).await)
    } else {
        Err(ServiceError::BadRequest(
            "missing or invalid credentials".to_string(),
        ))
    }
}

fn header_matches(headers: &HeaderMap, expected: &str) -> bool {
    if let Some(value) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        if value == expected {
            return true;
        }
    }
    if let Some(value) = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return token == expected;
        }
    }
    false
}
