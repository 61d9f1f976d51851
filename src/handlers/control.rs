//! Operational control handlers
//!
//! Monitoring start/stop, the synthetic flood trigger for demos, and the
//! direct payload-analysis endpoint. These are operator tools, not part of
//! the detection algorithm: the analysis endpoint is the one place scorer
//! failures surface as HTTP errors.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::monitor::{Alert, AlertClass, Severity, Verdict};
use crate::{AppError, AppResult, AppState};

/// POST /ml/ddos/monitor/start
pub async fn start(State(state): State<AppState>) -> Json<Value> {
    state.monitor.start_monitoring();
    Json(json!({ "success": true, "isMonitoring": state.monitor.is_monitoring() }))
}

/// POST /ml/ddos/monitor/stop
pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.monitor.stop_monitoring();
    Json(json!({ "success": true, "isMonitoring": state.monitor.is_monitoring() }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SimulateRequest {
    #[serde(default = "default_target_ip")]
    pub target_ip: String,
    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 30, message = "Duration must be between 1 and 30 seconds"))]
    pub duration: u64,
}

fn default_target_ip() -> String {
    "192.168.1.1".to_string()
}

fn default_duration() -> u64 {
    10
}

/// POST /ml/simulate-dos — inject a synthetic flood so the demo exercises
/// the real detection pipeline.
pub async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> AppResult<Json<Value>> {
    req.validate()
        .map_err(|err| AppError::ValidationError(err.to_string()))?;
    if req.target_ip.parse::<std::net::Ipv4Addr>().is_err() {
        return Err(AppError::ValidationError(
            "Invalid IP address format".to_string(),
        ));
    }

    let message = format!(
        "DoS attack simulation started on {} for {} seconds",
        req.target_ip, req.duration
    );
    state
        .monitor
        .alerts()
        .push(Alert::new(AlertClass::Info, Severity::Medium, message.clone()));
    state
        .monitor
        .clone()
        .start_flood_simulation(req.target_ip.clone(), req.duration);

    Ok(Json(json!({ "success": true, "message": message })))
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub payload: Option<String>,
}

/// POST /ml/xss/analyze — score a payload directly. A positive verdict runs
/// the full detection flow (alert, statistics, persistence).
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> AppResult<Json<Verdict>> {
    let payload = req
        .payload
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::ValidationError("Payload is required".to_string()))?;

    let verdict = state.monitor.analyze_payload(&payload).await?;
    Ok(Json(verdict))
}
