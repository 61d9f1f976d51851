//! Monitoring engine
//!
//! [`SecurityMonitor`] owns every piece of shared pipeline state — the
//! packet ring, the alert sink, the scorer bridge and the stats caches —
//! and is constructed once at startup, then shared as an `Arc` through
//! `AppState`. Detectors never reach into each other's internals; all
//! alert traffic goes through the sink this engine hands out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::alerts::{Alert, AlertClass, AlertSink, Severity};
use super::cache::{DetectionStats, StatsCache};
use super::detector::RuleDetector;
use super::features::TrafficFeatures;
use super::packet::{PacketRecorder, RequestMeta};
use super::scorer::{classify_attack, DetectionKind, ScorerBridge, ScorerConfig, ScorerError, Verdict};
use super::stats::{aggregate, TrafficStats};
use super::xss::{extract_candidates, preview, Candidate};

/// Attack buckets the flood dashboard understands.
pub const DDOS_BUCKETS: [&str; 4] = ["syn_flood", "udp_flood", "http_flood", "slowloris"];
/// Attack buckets the XSS dashboard understands.
pub const XSS_BUCKETS: [&str; 3] = ["reflected", "stored", "dom"];

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Packet ring capacity.
    pub packet_cap: usize,
    /// Alert sink capacity.
    pub alert_cap: usize,
    /// Trailing window the aggregator computes over.
    pub window_secs: u64,
    /// Analysis tick period.
    pub tick_interval: Duration,
    /// Rule detector: minimum requests/sec (strict).
    pub rate_threshold: f64,
    /// Rule detector: minimum average requests per source (strict).
    pub per_source_threshold: f64,
    /// Window request count above which the model scorer runs.
    pub min_activity: u64,
    /// Shortest candidate string worth scanning.
    pub min_candidate_len: usize,
    /// Per-request candidate cap.
    pub max_candidates: usize,
    /// JSON bodies larger than this are not scanned.
    pub max_scan_body_bytes: usize,
    /// TTL for the detection statistics caches.
    pub stats_ttl: Duration,
    /// Start the analysis tick at boot.
    pub auto_start: bool,
    /// Paths exempt from both middlewares (substring match).
    pub skip_paths: Vec<String>,
    pub scorer: ScorerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            packet_cap: 1000,
            alert_cap: 100,
            window_secs: 30,
            tick_interval: Duration::from_secs(5),
            rate_threshold: 20.0,
            per_source_threshold: 10.0,
            min_activity: 10,
            min_candidate_len: 5,
            max_candidates: 32,
            max_scan_body_bytes: 64 * 1024,
            stats_ttl: Duration::from_secs(300),
            auto_start: true,
            skip_paths: vec![
                "/ml/traffic".to_string(),
                "/ml/xss/analyze".to_string(),
                "/static".to_string(),
                "/health".to_string(),
                "/api/packets".to_string(),
            ],
            scorer: ScorerConfig::default(),
        }
    }
}

pub struct SecurityMonitor {
    config: MonitorConfig,
    recorder: PacketRecorder,
    alerts: AlertSink,
    scorer: ScorerBridge,
    detector: RuleDetector,
    ddos_stats: StatsCache,
    xss_stats: StatsCache,
    monitoring: AtomicBool,
}

impl SecurityMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            recorder: PacketRecorder::new(config.packet_cap),
            alerts: AlertSink::new(config.alert_cap),
            scorer: ScorerBridge::new(config.scorer.clone()),
            detector: RuleDetector::new(config.rate_threshold, config.per_source_threshold),
            ddos_stats: StatsCache::new(config.stats_ttl, &DDOS_BUCKETS),
            xss_stats: StatsCache::new(config.stats_ttl, &XSS_BUCKETS),
            monitoring: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn recorder(&self) -> &PacketRecorder {
        &self.recorder
    }

    pub fn alerts(&self) -> &AlertSink {
        &self.alerts
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }

    /// Enable the analysis tick. Returns false if it was already running.
    pub fn start_monitoring(&self) -> bool {
        let started = !self.monitoring.swap(true, Ordering::Relaxed);
        if started {
            tracing::info!("traffic monitoring started");
            self.alerts.push(Alert::new(
                AlertClass::Info,
                Severity::Low,
                "DDoS monitoring started",
            ));
        }
        started
    }

    /// Disable the analysis tick. Returns false if it was already stopped.
    pub fn stop_monitoring(&self) -> bool {
        let stopped = self.monitoring.swap(false, Ordering::Relaxed);
        if stopped {
            tracing::info!("traffic monitoring stopped");
            self.alerts.push(Alert::new(
                AlertClass::Info,
                Severity::Low,
                "DDoS monitoring stopped",
            ));
        }
        stopped
    }

    /// Whether the monitoring middlewares should ignore this path.
    pub fn should_skip(&self, path: &str) -> bool {
        self.config.skip_paths.iter().any(|p| path.contains(p.as_str()))
    }

    /// Record an arriving request. Infallible; see [`PacketRecorder`].
    pub fn record_request(&self, meta: RequestMeta) -> super::packet::RecordHandle {
        self.recorder.record(meta)
    }

    /// Spawn the periodic analysis loop.
    pub fn spawn_analysis_loop(self: Arc<Self>) -> JoinHandle<()> {
        let monitor = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                monitor.run_tick().await;
            }
        })
    }

    /// One analysis tick: aggregate the window, run the rule detector, and
    /// when traffic is busy enough hand a feature vector to the model.
    /// At most one scorer invocation per tick.
    pub async fn run_tick(&self) {
        if !self.is_monitoring() {
            return;
        }

        let records = self.recorder.snapshot();
        let stats = aggregate(&records, self.config.window_secs, Utc::now());
        if stats.request_count == 0 {
            // Nothing in the window: skip both detectors for this tick
            return;
        }

        if let Some(alert) = self.detector.evaluate(&stats) {
            tracing::warn!(
                rate = stats.request_rate,
                sources = stats.unique_sources,
                "rule-based flood threshold exceeded"
            );
            self.alerts.push(alert);
        }

        if stats.request_count > self.config.min_activity {
            let features = TrafficFeatures::from_stats(&stats);
            let verdict = match self.scorer.score_traffic(&features).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::error!(error = %err, "traffic scoring failed");
                    Verdict::negative()
                }
            };
            if verdict.is_positive() {
                self.record_traffic_detection(&stats, &features, &verdict).await;
            }
        }
    }

    async fn record_traffic_detection(
        &self,
        stats: &TrafficStats,
        features: &TrafficFeatures,
        verdict: &Verdict,
    ) {
        let bucket = classify_attack(verdict.attack_type.as_deref());
        let target = stats
            .most_targeted_path
            .clone()
            .unwrap_or_else(|| "HTTP Server".to_string());
        let source_ips: Vec<String> = stats.top_sources.iter().map(|s| s.ip.clone()).collect();

        tracing::warn!(
            bucket,
            confidence = verdict.confidence,
            target_path = %target,
            "model flagged flood traffic"
        );

        self.alerts.push(
            Alert::new(
                AlertClass::MlBased,
                Severity::High,
                format!("DDoS attack detected! {} targeting {}", bucket, target),
            )
            .with_confidence(verdict.confidence)
            .with_attack_type(bucket)
            .with_details(json!({
                "request_count": stats.request_count,
                "request_rate": stats.request_rate,
                "source_ips": source_ips,
                "target": target,
                "features": features,
            })),
        );

        self.ddos_stats.record_detection(Some(bucket));
        let detection = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "attack_type": bucket,
            "source_ips": source_ips,
            "target": target,
            "request_count": stats.request_count,
            "request_rate": stats.request_rate,
            "confidence": verdict.confidence,
        });
        if let Err(err) = self.scorer.save_detection(DetectionKind::Ddos, &detection).await {
            tracing::error!(error = %err, "failed to persist flood detection");
        }
        self.ddos_stats.invalidate();
    }

    /// Scan one request's surfaces for injection content. Candidates are
    /// scored sequentially; failures are logged and skipped. Never fails the
    /// request.
    pub async fn scan_request(
        &self,
        path: &str,
        method: &str,
        query: &HashMap<String, String>,
        headers: &HashMap<String, String>,
        body: Option<&Value>,
    ) {
        let candidates = extract_candidates(
            path,
            query,
            headers,
            body,
            self.config.min_candidate_len,
            self.config.max_candidates,
        );

        for candidate in candidates {
            match self.scorer.score_payload(&candidate.value).await {
                Ok(verdict) if verdict.is_positive() => {
                    self.record_payload_detection(path, method, &candidate, &verdict)
                        .await;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        vector = candidate.kind.as_str(),
                        key = %candidate.key,
                        "payload scoring failed"
                    );
                }
            }
        }
    }

    async fn record_payload_detection(
        &self,
        path: &str,
        method: &str,
        candidate: &Candidate,
        verdict: &Verdict,
    ) {
        let value_preview = preview(&candidate.value);
        tracing::warn!(
            vector = candidate.kind.as_str(),
            key = %candidate.key,
            path = %path,
            "XSS attack detected"
        );

        let mut alert = Alert::new(
            AlertClass::Xss,
            Severity::High,
            format!(
                "XSS attack detected in {}.{}: {}",
                candidate.kind.as_str(),
                candidate.key,
                value_preview
            ),
        )
        .with_confidence(verdict.confidence)
        .with_details(json!({
            "vector_type": candidate.kind,
            "vector_key": candidate.key,
            "value_preview": value_preview,
            "request_path": path,
            "request_method": method,
            "confidence": verdict.confidence,
            "attack_type": verdict.attack_type,
        }));
        if let Some(kind) = &verdict.attack_type {
            alert = alert.with_attack_type(kind.clone());
        }
        self.alerts.push(alert);

        self.xss_stats.record_detection(verdict.attack_type.as_deref());
        let detection = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "is_attack": verdict.is_attack,
            "confidence": verdict.confidence,
            "attack_type": verdict.attack_type,
            "request_path": path,
            "request_method": method,
            "vector_type": candidate.kind,
            "vector_key": candidate.key,
        });
        if let Err(err) = self.scorer.save_detection(DetectionKind::Xss, &detection).await {
            tracing::error!(error = %err, "failed to persist XSS detection");
        }
        self.xss_stats.invalidate();
    }

    /// Score a payload on behalf of the analyze endpoint. Unlike the
    /// middleware path, scorer failures propagate here: this IS the scorer's
    /// operator surface.
    pub async fn analyze_payload(&self, payload: &str) -> Result<Verdict, ScorerError> {
        let verdict = self.scorer.score_payload(payload).await?;
        if verdict.is_positive() {
            let candidate = Candidate {
                kind: super::xss::VectorKind::Body,
                key: "payload".to_string(),
                value: payload.to_string(),
            };
            self.record_payload_detection("/ml/xss/analyze", "POST", &candidate, &verdict)
                .await;
        }
        Ok(verdict)
    }

    /// TTL-cached flood statistics; stale data on scorer failure, never an
    /// error.
    pub async fn ddos_dashboard_stats(&self) -> DetectionStats {
        self.refresh_stats(DetectionKind::Ddos, &self.ddos_stats).await
    }

    /// TTL-cached XSS statistics.
    pub async fn xss_dashboard_stats(&self) -> DetectionStats {
        self.refresh_stats(DetectionKind::Xss, &self.xss_stats).await
    }

    async fn refresh_stats(&self, kind: DetectionKind, cache: &StatsCache) -> DetectionStats {
        if cache.is_stale() {
            match self.scorer.fetch_stats(kind).await {
                Ok(stats) => cache.store(stats),
                Err(err) => {
                    tracing::error!(error = %err, "stats refresh failed, serving cached value");
                }
            }
        }
        cache.get()
    }

    /// Inject a synthetic flood into the recorder for `duration_secs`, so the
    /// demo trigger exercises the real detection path instead of staging a
    /// canned alert.
    pub fn start_flood_simulation(self: Arc<Self>, target_ip: String, duration_secs: u64) {
        let monitor = self;
        tokio::spawn(async move {
            tracing::info!(target_ip = %target_ip, duration_secs, "flood simulation started");

            let sources: Vec<String> = {
                let mut rng = rand::thread_rng();
                (0..5)
                    .map(|_| {
                        format!(
                            "{}.{}.{}.{}",
                            rng.gen_range(1..=255),
                            rng.gen_range(1..=255),
                            rng.gen_range(1..=255),
                            rng.gen_range(1..=255)
                        )
                    })
                    .collect()
            };

            let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);
            while tokio::time::Instant::now() < deadline {
                {
                    let mut rng = rand::thread_rng();
                    let batch = rng.gen_range(10..=20);
                    for _ in 0..batch {
                        let src_ip = sources[rng.gen_range(0..sources.len())].clone();
                        let handle = monitor.recorder.record(RequestMeta {
                            src_ip,
                            dst_host: target_ip.clone(),
                            // Handshake-like probes read as SYN traffic to the
                            // feature extractor
                            method: "HEAD".to_string(),
                            path: "/".to_string(),
                            content_length: rng.gen_range(64..=128),
                            ..Default::default()
                        });
                        monitor.recorder.complete(handle, 200, rng.gen_range(1..=5), 0);
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            tracing::info!(target_ip = %target_ip, "flood simulation completed");
        });
    }
}
