//! Rule-based flood detector
//!
//! Pure threshold check over a [`TrafficStats`] snapshot. Both thresholds
//! must be exceeded at once: high fan-out with low volume, or high volume
//! from a single well-behaved source, should not fire on its own.

use serde_json::json;

use super::alerts::{Alert, AlertClass, Severity};
use super::stats::TrafficStats;

#[derive(Debug, Clone)]
pub struct RuleDetector {
    /// Minimum requests/sec over the window (strict).
    pub rate_threshold: f64,
    /// Minimum average requests per source (strict).
    pub per_source_threshold: f64,
}

impl RuleDetector {
    pub fn new(rate_threshold: f64, per_source_threshold: f64) -> Self {
        Self {
            rate_threshold,
            per_source_threshold,
        }
    }

    /// Evaluate one snapshot. Fires only when BOTH thresholds are strictly
    /// exceeded; re-fires on every tick while the condition persists.
    pub fn evaluate(&self, stats: &TrafficStats) -> Option<Alert> {
        if stats.request_rate > self.rate_threshold
            && stats.avg_requests_per_source > self.per_source_threshold
        {
            let alert = Alert::new(
                AlertClass::RuleBased,
                Severity::Medium,
                format!(
                    "High request volume: {:.1} req/s from {} sources",
                    stats.request_rate, stats.unique_sources
                ),
            )
            .with_details(json!({
                "request_count": stats.request_count,
                "request_rate": stats.request_rate,
                "unique_sources": stats.unique_sources,
                "avg_requests_per_source": stats.avg_requests_per_source,
                "top_sources": stats.top_sources,
                "most_targeted_path": stats.most_targeted_path,
                "window_start": stats.window_start,
                "window_end": stats.window_end,
            }));
            Some(alert)
        } else {
            None
        }
    }
}
