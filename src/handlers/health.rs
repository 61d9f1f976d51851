//! Health check handler

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    monitoring: bool,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        monitoring: state.monitor.is_monitoring(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[derive(Serialize)]
pub struct BannerResponse {
    service: &'static str,
    version: &'static str,
}

pub async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
