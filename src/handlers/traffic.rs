//! Traffic telemetry handlers

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::monitor::{aggregate, PacketRecord};
use crate::AppState;

/// How many entries the top-N lists carry.
const TOP_N: usize = 5;

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

/// Recent packet records, oldest first. Serves both `/ml/traffic/recent`
/// and the packet-log viewer's `/api/packets`.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<PacketRecord>> {
    Json(state.monitor.recorder().recent(query.limit.unwrap_or(100)))
}

#[derive(Serialize)]
pub struct CountEntry {
    pub key: String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct TrafficOverview {
    pub total_requests: usize,
    /// Requests in the trailing 60 seconds.
    pub recent_requests: u64,
    /// Requests per second over that minute.
    pub request_rate: f64,
    pub method_distribution: HashMap<String, u64>,
    pub status_distribution: HashMap<String, u64>,
    pub top_ips: Vec<CountEntry>,
    pub top_paths: Vec<CountEntry>,
}

/// Live traffic overview: buffer-wide distributions plus a one-minute
/// request rate.
pub async fn stats(State(state): State<AppState>) -> Json<TrafficOverview> {
    let records = state.monitor.recorder().snapshot();
    let minute = aggregate(&records, 60, Utc::now());

    let mut methods: HashMap<String, u64> = HashMap::new();
    let mut statuses: HashMap<String, u64> = HashMap::new();
    let mut ips: HashMap<String, u64> = HashMap::new();
    let mut paths: HashMap<String, u64> = HashMap::new();
    for rec in &records {
        *methods.entry(rec.method.clone()).or_insert(0) += 1;
        if let Some(status) = rec.status_code {
            *statuses.entry(status.to_string()).or_insert(0) += 1;
        }
        *ips.entry(rec.src_ip.clone()).or_insert(0) += 1;
        *paths.entry(rec.path.clone()).or_insert(0) += 1;
    }

    Json(TrafficOverview {
        total_requests: records.len(),
        recent_requests: minute.request_count,
        request_rate: minute.request_rate,
        method_distribution: methods,
        status_distribution: statuses,
        top_ips: top_n(ips),
        top_paths: top_n(paths),
    })
}

fn top_n(counts: HashMap<String, u64>) -> Vec<CountEntry> {
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(TOP_N)
        .map(|(key, count)| CountEntry { key, count })
        .collect()
}
