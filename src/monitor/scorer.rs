//! Anomaly scorer bridge
//!
//! Invokes the external scoring process (one script per contract: traffic
//! feature vectors, injection payloads, statistics, detection persistence)
//! and parses its JSON verdict. The bridge is deliberately paranoid: spawn
//! failures, non-zero exits, malformed output and timeouts are all errors
//! the caller resolves to a negative verdict — scorer trouble must never
//! become pipeline trouble.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use super::cache::DetectionStats;
use super::features::TrafficFeatures;

/// Script names fixed by the scoring-model contract.
const TRAFFIC_ANALYZE: &str = "ddos_analyze.py";
const PAYLOAD_ANALYZE: &str = "xss_analyze.py";
const TRAFFIC_STATS: &str = "ddos_stats.py";
const PAYLOAD_STATS: &str = "xss_stats.py";
const TRAFFIC_SAVE: &str = "ddos_save_detection.py";
const PAYLOAD_SAVE: &str = "xss_save_detection.py";

/// The two detection families the external model covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Ddos,
    Xss,
}

/// Classification output of the external scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub is_attack: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
}

impl Verdict {
    /// The default verdict every failure resolves to.
    pub fn negative() -> Self {
        Self {
            is_attack: false,
            confidence: 0.0,
            attack_type: None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.is_attack || self.confidence > 0.7
    }
}

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("failed to spawn scorer process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("scorer exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("scorer output was not valid JSON: {0}")]
    BadOutput(#[from] serde_json::Error),
    #[error("scorer timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Interpreter used to run the scoring scripts.
    pub program: String,
    pub scripts_dir: PathBuf,
    /// Hard bound on a single invocation.
    pub timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            scripts_dir: PathBuf::from("ml/scripts"),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct ScorerBridge {
    config: ScorerConfig,
}

impl ScorerBridge {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score a window feature vector for flood traffic.
    pub async fn score_traffic(&self, features: &TrafficFeatures) -> Result<Verdict, ScorerError> {
        let payload = serde_json::to_string(features)?;
        let stdout = self.run_script(TRAFFIC_ANALYZE, &[&payload]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Score a single candidate string for injection content.
    pub async fn score_payload(&self, payload: &str) -> Result<Verdict, ScorerError> {
        let stdout = self.run_script(PAYLOAD_ANALYZE, &[payload]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Recompute aggregate detection statistics for one family.
    pub async fn fetch_stats(&self, kind: DetectionKind) -> Result<DetectionStats, ScorerError> {
        let script = match kind {
            DetectionKind::Ddos => TRAFFIC_STATS,
            DetectionKind::Xss => PAYLOAD_STATS,
        };
        let stdout = self.run_script(script, &[]).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Persist a detection for long-term statistics. Best effort; callers
    /// log and continue on failure.
    pub async fn save_detection(
        &self,
        kind: DetectionKind,
        detection: &Value,
    ) -> Result<(), ScorerError> {
        let script = match kind {
            DetectionKind::Ddos => TRAFFIC_SAVE,
            DetectionKind::Xss => PAYLOAD_SAVE,
        };
        let payload = serde_json::to_string(detection)?;
        self.run_script(script, &[&payload]).await?;
        Ok(())
    }

    async fn run_script(&self, script: &str, args: &[&str]) -> Result<String, ScorerError> {
        let script_path = self.config.scripts_dir.join(script);
        if !script_path.exists() {
            return Err(ScorerError::ScriptNotFound(script_path));
        }

        let mut cmd = Command::new(&self.config.program);
        cmd.arg(&script_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| ScorerError::Timeout(self.config.timeout))??;

        if !output.status.success() {
            return Err(ScorerError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Map the scorer's free-form attack label onto the fixed bucket set the
/// dashboard understands. Unknown labels land in the generic HTTP-flood
/// bucket.
pub fn classify_attack(label: Option<&str>) -> &'static str {
    let label = label.unwrap_or("").to_ascii_lowercase();
    if label.contains("syn") {
        "syn_flood"
    } else if label.contains("udp") {
        "udp_flood"
    } else if label.contains("slow") {
        "slowloris"
    } else {
        "http_flood"
    }
}
