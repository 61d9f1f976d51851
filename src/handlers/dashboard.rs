//! Dashboard aggregate handlers
//!
//! Detection statistics served through the TTL caches; a scorer outage
//! means stale (or empty) numbers, never an error page.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::monitor::{Alert, DetectionStats};
use crate::AppState;

/// Alerts included in the combined dashboard snapshot.
const DASHBOARD_ALERTS: usize = 10;

pub async fn xss_stats(State(state): State<AppState>) -> Json<DetectionStats> {
    Json(state.monitor.xss_dashboard_stats().await)
}

pub async fn ddos_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.monitor.ddos_dashboard_stats().await;
    Json(with_monitoring_flag(stats, state.monitor.is_monitoring()))
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub xss: DetectionStats,
    pub ddos: Value,
    /// The 10 most recent alerts, newest last.
    pub alerts: Vec<Alert>,
}

/// Combined snapshot for the security dashboard.
pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    let xss = state.monitor.xss_dashboard_stats().await;
    let ddos = state.monitor.ddos_dashboard_stats().await;

    Json(DashboardResponse {
        xss,
        ddos: with_monitoring_flag(ddos, state.monitor.is_monitoring()),
        alerts: state.monitor.alerts().recent(DASHBOARD_ALERTS),
    })
}

fn with_monitoring_flag(stats: DetectionStats, monitoring: bool) -> Value {
    let mut value = serde_json::to_value(stats).unwrap_or_else(|_| json!({}));
    if let Some(map) = value.as_object_mut() {
        map.insert("isMonitoring".to_string(), Value::Bool(monitoring));
    }
    value
}
