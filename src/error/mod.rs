use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<TemplateError> for AppError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::NotFound(msg) => AppError::NotFound(msg),
            TemplateError::AlreadyExists(name) => {
                AppError::Conflict(format!("Template with name {} already exists", name))
            }
            TemplateError::InvalidName(msg) | TemplateError::InvalidTemplate(msg) => {
                AppError::Validation(msg)
            }
            TemplateError::Storage(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => AppError::NotFound(format!("Notification {} not found", id)),
            other => AppError::Storage(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

/// Hide internal details from clients in production
fn redact(detail: &str, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        detail.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Storage(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_ERROR",
                redact(e, "Service temporarily unavailable"),
                e.clone(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_mapping() {
        let err: AppError = TemplateError::NotFound("Template with ID x not found".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = TemplateError::AlreadyExists("welcome_email".into()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("welcome_email")));

        let err: AppError = TemplateError::InvalidName("bad".into()).into();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Storage("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
