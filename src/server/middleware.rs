use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::error::AppError;

pub const API_KEY_HEADER: &str = "X-API-Key";

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Guards the admin routes with `X-API-Key`.
///
/// Passes everything through when `api.key` is unset.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.settings.api.key.as_deref() else {
        return Ok(next.run(req).await);
    };

    match presented_key(req.headers()) {
        Some(key) if key == expected => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected admin request with wrong API key");
            Err(AppError::Auth("Invalid API key".to_string()))
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Rejected admin request without API key");
            Err(AppError::Auth("Missing API key".to_string()))
        }
    }
}
