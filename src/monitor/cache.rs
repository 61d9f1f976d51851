//! Detection statistics cache
//!
//! TTL cache over the external stats scripts' aggregate output. Local
//! counters are bumped on every fresh detection so reads stay live between
//! refreshes; a refresh failure simply leaves the cached value in place.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Most recent detection timestamps kept per family.
const RECENT_TIMESTAMPS_CAP: usize = 100;

/// Aggregate detection statistics; wire names follow the stats scripts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionStats {
    #[serde(rename = "totalDetections", default)]
    pub total_detections: u64,
    #[serde(rename = "byType", default)]
    pub by_type: HashMap<String, u64>,
    #[serde(rename = "recentTimestamps", default)]
    pub recent_timestamps: Vec<String>,
}

impl DetectionStats {
    /// Zeroed stats pre-seeded with the family's known buckets.
    pub fn empty(buckets: &[&str]) -> Self {
        Self {
            total_detections: 0,
            by_type: buckets.iter().map(|b| (b.to_string(), 0)).collect(),
            recent_timestamps: Vec::new(),
        }
    }
}

struct CacheState {
    stats: DetectionStats,
    last_updated: Option<Instant>,
}

/// One cache per detection family.
pub struct StatsCache {
    ttl: Duration,
    inner: Mutex<CacheState>,
}

impl StatsCache {
    pub fn new(ttl: Duration, buckets: &[&str]) -> Self {
        Self {
            ttl,
            inner: Mutex::new(CacheState {
                stats: DetectionStats::empty(buckets),
                last_updated: None,
            }),
        }
    }

    /// True when the cached value has never been refreshed or has outlived
    /// the TTL.
    pub fn is_stale(&self) -> bool {
        match self.inner.lock().last_updated {
            Some(at) => at.elapsed() > self.ttl,
            None => true,
        }
    }

    pub fn get(&self) -> DetectionStats {
        self.inner.lock().stats.clone()
    }

    /// Replace the cached value with a freshly recomputed one.
    pub fn store(&self, stats: DetectionStats) {
        let mut state = self.inner.lock();
        state.stats = stats;
        state.last_updated = Some(Instant::now());
    }

    /// Force the next read to recompute.
    pub fn invalidate(&self) {
        self.inner.lock().last_updated = None;
    }

    /// Bump local counters for a detection persisted just now, so reads are
    /// current even before the next external refresh.
    pub fn record_detection(&self, attack_type: Option<&str>) {
        let mut state = self.inner.lock();
        state.stats.total_detections += 1;
        if let Some(kind) = attack_type {
            *state.stats.by_type.entry(kind.to_string()).or_insert(0) += 1;
        }
        state.stats.recent_timestamps.push(Utc::now().to_rfc3339());
        let len = state.stats.recent_timestamps.len();
        if len > RECENT_TIMESTAMPS_CAP {
            state.stats.recent_timestamps.drain(..len - RECENT_TIMESTAMPS_CAP);
        }
    }
}
