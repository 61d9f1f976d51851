//! Error handling
//!
//! Only the operator-facing `/ml` surface produces HTTP errors. Pipeline
//! failures on the monitored request path are logged and swallowed — a
//! monitored client must never see a 5xx because observability broke.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::monitor::ScorerError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Validation errors
    ValidationError(String),

    // External service errors
    ExternalServiceError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::ExternalServiceError(msg) => {
                tracing::error!("External service error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Scoring service unavailable")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ScorerError> for AppError {
    fn from(err: ScorerError) -> Self {
        AppError::ExternalServiceError(err.to_string())
    }
}
