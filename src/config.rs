//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::monitor::{MonitorConfig, ScorerConfig};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Monitoring pipeline settings
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = MonitorConfig::default();
        let scorer_defaults = ScorerConfig::default();

        let monitor = MonitorConfig {
            packet_cap: parse_env("MONITOR_PACKET_CAP", defaults.packet_cap),
            alert_cap: parse_env("MONITOR_ALERT_CAP", defaults.alert_cap),
            window_secs: parse_env("MONITOR_WINDOW_SECS", defaults.window_secs),
            tick_interval: Duration::from_secs(parse_env(
                "MONITOR_TICK_SECS",
                defaults.tick_interval.as_secs(),
            )),
            rate_threshold: parse_env("MONITOR_RATE_THRESHOLD", defaults.rate_threshold),
            per_source_threshold: parse_env(
                "MONITOR_PER_SOURCE_THRESHOLD",
                defaults.per_source_threshold,
            ),
            min_activity: parse_env("MONITOR_MIN_ACTIVITY", defaults.min_activity),
            min_candidate_len: parse_env("SCAN_MIN_CANDIDATE_LEN", defaults.min_candidate_len),
            max_candidates: parse_env("SCAN_MAX_CANDIDATES", defaults.max_candidates),
            max_scan_body_bytes: parse_env("SCAN_MAX_BODY_BYTES", defaults.max_scan_body_bytes),
            stats_ttl: Duration::from_secs(parse_env(
                "STATS_CACHE_TTL_SECS",
                defaults.stats_ttl.as_secs(),
            )),
            auto_start: parse_env("MONITOR_AUTO_START", defaults.auto_start),
            skip_paths: defaults.skip_paths,
            scorer: ScorerConfig {
                program: env::var("SCORER_PROGRAM").unwrap_or(scorer_defaults.program),
                scripts_dir: env::var("SCORER_SCRIPTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(scorer_defaults.scripts_dir),
                timeout: Duration::from_secs(parse_env(
                    "SCORER_TIMEOUT_SECS",
                    scorer_defaults.timeout.as_secs(),
                )),
            },
        };

        Self {
            port: parse_env("PORT", 3001),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            monitor,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
