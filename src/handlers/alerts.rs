//! Security alert handlers

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::monitor::{Alert, AlertClass, Severity};
use crate::{AppError, AppResult, AppState};

#[derive(Deserialize)]
pub struct AlertQuery {
    limit: Option<usize>,
}

/// List the most recent alerts, newest last.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Json<Vec<Alert>> {
    Json(state.monitor.alerts().recent(query.limit.unwrap_or(50)))
}

#[derive(Deserialize)]
pub struct TestAlertRequest {
    pub message: Option<String>,
    pub severity: Option<String>,
}

/// Append a test alert (development aid).
pub async fn create_test(
    State(state): State<AppState>,
    Json(req): Json<TestAlertRequest>,
) -> AppResult<Json<Alert>> {
    let severity = match req.severity.as_deref().unwrap_or("medium") {
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        other => {
            return Err(AppError::ValidationError(format!(
                "Unknown severity: {}",
                other
            )))
        }
    };

    let alert = state.monitor.alerts().push(Alert::new(
        AlertClass::Info,
        severity,
        req.message.unwrap_or_else(|| "Test alert".to_string()),
    ));
    Ok(Json(alert))
}
