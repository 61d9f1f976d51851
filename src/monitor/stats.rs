//! Windowed traffic statistics
//!
//! Pure aggregation over a snapshot of the packet ring. Recomputed on every
//! analysis tick; never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::packet::PacketRecord;

/// How many offending sources the detectors report.
pub const TOP_SOURCES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub ip: String,
    pub count: u64,
}

/// Derived statistics for one trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficStats {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub request_count: u64,
    pub unique_sources: u64,
    pub avg_requests_per_source: f64,
    /// Requests per second over the window.
    pub request_rate: f64,
    pub source_counts: HashMap<String, u64>,
    /// Top sources by count, descending; ties broken by first-seen order.
    pub top_sources: Vec<SourceCount>,
    pub path_counts: HashMap<String, u64>,
    /// Highest-count path; ties broken by first-seen order.
    pub most_targeted_path: Option<String>,
    pub method_counts: HashMap<String, u64>,
    pub avg_content_length: f64,
}

/// Compute statistics over records within `[now - window_secs, now]`.
pub fn aggregate(records: &[PacketRecord], window_secs: u64, now: DateTime<Utc>) -> TrafficStats {
    let window_start = now - Duration::seconds(window_secs as i64);

    // Count maps keep the first-seen index so ties resolve deterministically.
    let mut sources: HashMap<String, (u64, usize)> = HashMap::new();
    let mut paths: HashMap<String, (u64, usize)> = HashMap::new();
    let mut methods: HashMap<String, u64> = HashMap::new();
    let mut request_count = 0u64;
    let mut content_total = 0u64;

    for rec in records {
        if rec.timestamp < window_start || rec.timestamp > now {
            continue;
        }
        let idx = request_count as usize;
        request_count += 1;
        content_total += rec.content_length;

        sources.entry(rec.src_ip.clone()).or_insert((0, idx)).0 += 1;
        paths.entry(rec.path.clone()).or_insert((0, idx)).0 += 1;
        *methods.entry(rec.method.clone()).or_insert(0) += 1;
    }

    let unique_sources = sources.len() as u64;

    let mut top_sources: Vec<(&String, &(u64, usize))> = sources.iter().collect();
    top_sources.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    let top_sources = top_sources
        .into_iter()
        .take(TOP_SOURCES)
        .map(|(ip, (count, _))| SourceCount {
            ip: ip.clone(),
            count: *count,
        })
        .collect();

    let most_targeted_path = paths
        .iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(path, _)| path.clone());

    TrafficStats {
        window_start,
        window_end: now,
        request_count,
        unique_sources,
        avg_requests_per_source: request_count as f64 / unique_sources.max(1) as f64,
        request_rate: request_count as f64 / window_secs.max(1) as f64,
        source_counts: sources.iter().map(|(ip, (c, _))| (ip.clone(), *c)).collect(),
        top_sources,
        path_counts: paths.iter().map(|(p, (c, _))| (p.clone(), *c)).collect(),
        most_targeted_path,
        method_counts: methods,
        avg_content_length: content_total as f64 / request_count.max(1) as f64,
    }
}
