//! MedShield Security Monitor
//!
//! Security monitoring service for the MedShield healthcare platform.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 MEDSHIELD SECURITY MONITOR                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ request ──► traffic middleware ──► xss middleware ──► routes │
//! │                │                       │                     │
//! │                ▼                       ▼                     │
//! │          packet ring            candidate scan ──► scorer    │
//! │                │                       │                     │
//! │   (5s tick) aggregator ─► rule detector│                     │
//! │                │                       │                     │
//! │                ▼                       ▼                     │
//! │         feature vector ─► scorer ─► alert sink ─► dashboard  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scoring model runs out of process; its verdicts are advisory and its
//! failures degrade to "no detection this cycle", never to request failures.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod monitor;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
pub use error::{AppError, AppResult};

use monitor::SecurityMonitor;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<SecurityMonitor>,
    pub config: Config,
}

/// Create the main router with all routes and the monitoring middleware
pub fn create_router(state: AppState) -> Router {
    let ml_routes = Router::new()
        .route("/ml/alerts", get(handlers::alerts::list))
        .route("/ml/alerts/test", post(handlers::alerts::create_test))
        .route("/ml/traffic/recent", get(handlers::traffic::recent))
        .route("/ml/traffic/stats", get(handlers::traffic::stats))
        .route("/ml/xss/stats", get(handlers::dashboard::xss_stats))
        .route("/ml/ddos/stats", get(handlers::dashboard::ddos_stats))
        .route("/ml/dashboard", get(handlers::dashboard::dashboard))
        .route("/ml/xss/analyze", post(handlers::control::analyze))
        .route("/ml/ddos/monitor/start", post(handlers::control::start))
        .route("/ml/ddos/monitor/stop", post(handlers::control::stop))
        .route("/ml/simulate-dos", post(handlers::control::simulate));

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::check))
        .route("/api/packets", get(handlers::traffic::recent))
        .merge(ml_routes)
        // Scanning runs inside the recording span so response latency covers it
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::xss::xss_scanner,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::traffic::traffic_monitor,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
