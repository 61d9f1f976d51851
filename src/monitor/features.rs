//! Feature extraction for the external scoring model
//!
//! Deterministic mapping from a [`TrafficStats`] snapshot to the fixed-shape
//! numeric record the scoring model expects. Field names follow the model's
//! existing wire contract.
//!
//! The protocol and flag fields are heuristics: the monitor sees HTTP
//! requests, not transport-layer packets, so verbs stand in for TCP flags.
//! That is a documented limitation of the capture path, not something to
//! silently "fix" here.

use serde::{Deserialize, Serialize};

use super::stats::TrafficStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficFeatures {
    pub pktcount: u64,
    /// Estimated from average declared content length.
    pub bytecount: u64,
    /// Window duration in seconds.
    pub dur: f64,
    /// Distinct sources stand in for flows.
    pub flows: u64,
    pub pktperflow: f64,
    pub byteperflow: f64,
    pub pktrate: f64,
    /// "TCP" when the window contains POST traffic, "UDP" otherwise.
    #[serde(rename = "Protocol")]
    pub protocol: String,
    /// Pseudo-flag ratios derived from HTTP verbs, each in [0, 1]:
    /// syn = HEAD/OPTIONS, ack = GET, psh = POST/PUT/PATCH, rst = DELETE,
    /// fin = everything else.
    pub syn_flag: f64,
    pub ack_flag: f64,
    pub psh_flag: f64,
    pub rst_flag: f64,
    pub fin_flag: f64,
}

impl TrafficFeatures {
    pub fn from_stats(stats: &TrafficStats) -> Self {
        let count = stats.request_count;
        let flows = stats.unique_sources;
        let bytecount = (stats.avg_content_length * count as f64).round() as u64;

        let methods = |names: &[&str]| -> u64 {
            names
                .iter()
                .map(|m| stats.method_counts.get(*m).copied().unwrap_or(0))
                .sum()
        };

        let syn = methods(&["HEAD", "OPTIONS"]);
        let ack = methods(&["GET"]);
        let psh = methods(&["POST", "PUT", "PATCH"]);
        let rst = methods(&["DELETE"]);
        let fin = count.saturating_sub(syn + ack + psh + rst);

        // All divisions keep a floor of 1 so a defensive vector built from an
        // empty window still has every ratio in [0, 1].
        let denom = count.max(1) as f64;

        Self {
            pktcount: count,
            bytecount,
            dur: (stats.window_end - stats.window_start).num_seconds().max(0) as f64,
            flows,
            pktperflow: count as f64 / flows.max(1) as f64,
            byteperflow: bytecount as f64 / flows.max(1) as f64,
            pktrate: stats.request_rate,
            protocol: if methods(&["POST"]) > 0 { "TCP" } else { "UDP" }.to_string(),
            syn_flag: syn as f64 / denom,
            ack_flag: ack as f64 / denom,
            psh_flag: psh as f64 / denom,
            rst_flag: rst as f64 / denom,
            fin_flag: fin as f64 / denom,
        }
    }
}
