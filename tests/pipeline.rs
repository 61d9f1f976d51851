//! End-to-end pipeline tests
//!
//! The external scorer is mocked with small shell scripts written into a
//! temp directory and executed through `sh`, exercising the real subprocess
//! contract: JSON on stdout, non-zero exits, malformed output.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use medshield_monitor::monitor::{
    AlertClass, MonitorConfig, RequestMeta, ScorerConfig, SecurityMonitor, Severity,
};
use medshield_monitor::{create_router, AppState, Config};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const NEGATIVE_VERDICT: &str = r#"echo '{"is_attack": false, "confidence": 0.1}'"#;

fn write_script(dir: &TempDir, name: &str, body: &str) {
    std::fs::write(dir.path().join(name), body).unwrap();
}

fn monitor_config(dir: &TempDir) -> MonitorConfig {
    MonitorConfig {
        // Low thresholds so a handful of test requests trips the detector
        rate_threshold: 0.2,
        per_source_threshold: 5.0,
        scorer: ScorerConfig {
            program: "sh".to_string(),
            scripts_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(2),
        },
        ..MonitorConfig::default()
    }
}

fn monitor_with(config: MonitorConfig) -> Arc<SecurityMonitor> {
    let monitor = Arc::new(SecurityMonitor::new(config));
    monitor.start_monitoring();
    // Drop the startup info alert so assertions see only detection alerts
    monitor
}

fn app(monitor: Arc<SecurityMonitor>, config: MonitorConfig) -> axum::Router {
    create_router(AppState {
        monitor,
        config: Config {
            port: 0,
            environment: "test".to_string(),
            monitor: config,
        },
    })
}

fn flood(monitor: &SecurityMonitor, src: &str, n: usize) {
    for _ in 0..n {
        let handle = monitor.record_request(RequestMeta {
            src_ip: src.to_string(),
            dst_host: "localhost".to_string(),
            method: "GET".to_string(),
            path: "/patients".to_string(),
            ..Default::default()
        });
        monitor.recorder().complete(handle, 200, 3, 128);
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// === Scenario A: rule-based detection =====================================

#[tokio::test]
async fn rule_alert_fires_once_per_tick_while_condition_persists() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "ddos_analyze.py", NEGATIVE_VERDICT);
    let monitor = monitor_with(monitor_config(&dir));
    let baseline = monitor.alerts().len();

    // 15 requests from 2 sources within the window: 0.5 req/s over 30s and
    // 7.5 requests per source, both above the configured thresholds
    flood(&monitor, "203.0.113.7", 8);
    flood(&monitor, "203.0.113.9", 7);

    monitor.run_tick().await;
    monitor.run_tick().await;

    let alerts: Vec<_> = monitor
        .alerts()
        .recent(100)
        .into_iter()
        .skip(baseline)
        .collect();
    assert_eq!(alerts.len(), 2, "one rule alert per tick, no more");
    for alert in &alerts {
        assert_eq!(alert.class, AlertClass::RuleBased);
        assert_eq!(alert.severity, Severity::Medium);

        let top = alert.details["top_sources"].as_array().unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["ip"], "203.0.113.7");
        assert_eq!(top[0]["count"], 8);
        assert_eq!(top[1]["ip"], "203.0.113.9");
        assert_eq!(top[1]["count"], 7);
    }
}

#[tokio::test]
async fn quiet_traffic_fires_nothing() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "ddos_analyze.py", NEGATIVE_VERDICT);
    let monitor = monitor_with(monitor_config(&dir));
    let baseline = monitor.alerts().len();

    // One source, well under the per-source threshold
    flood(&monitor, "203.0.113.7", 4);
    monitor.run_tick().await;

    assert_eq!(monitor.alerts().len(), baseline);
}

// === Scenario: model-based detection ======================================

#[tokio::test]
async fn positive_verdict_appends_ml_alert_with_bucket() {
    let dir = TempDir::new().unwrap();
    write_script(
        &dir,
        "ddos_analyze.py",
        r#"echo '{"is_attack": true, "confidence": 0.88, "attack_type": "SYN Flood"}'"#,
    );
    write_script(&dir, "ddos_save_detection.py", "echo '{}'");
    let mut config = monitor_config(&dir);
    // Keep the rule detector quiet so only the model path fires
    config.rate_threshold = 1000.0;
    let monitor = monitor_with(config);
    let baseline = monitor.alerts().len();

    flood(&monitor, "203.0.113.7", 12);
    monitor.run_tick().await;

    let alerts: Vec<_> = monitor
        .alerts()
        .recent(100)
        .into_iter()
        .skip(baseline)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].class, AlertClass::MlBased);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].attack_type.as_deref(), Some("syn_flood"));
    assert_eq!(alerts[0].confidence, Some(0.88));
    assert_eq!(alerts[0].details["target"], "/patients");
}

#[tokio::test]
async fn idle_window_skips_the_scorer() {
    let dir = TempDir::new().unwrap();
    // A scorer that would blow up if ever invoked
    write_script(&dir, "ddos_analyze.py", "exit 7");
    let monitor = monitor_with(monitor_config(&dir));
    let baseline = monitor.alerts().len();

    // Below the min-activity bar: no feature vector, no invocation
    flood(&monitor, "203.0.113.7", 2);
    monitor.run_tick().await;

    assert_eq!(monitor.alerts().len(), baseline);
}

// === Scenario C: scorer failure degrades to a negative verdict ============

#[tokio::test]
async fn scorer_non_zero_exit_appends_no_alerts() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "ddos_analyze.py", "echo 'model exploded' >&2; exit 1");
    let mut config = monitor_config(&dir);
    config.rate_threshold = 1000.0;
    let monitor = monitor_with(config);
    let baseline = monitor.alerts().len();

    flood(&monitor, "203.0.113.7", 20);
    monitor.run_tick().await;

    assert_eq!(monitor.alerts().len(), baseline);
}

#[tokio::test]
async fn scorer_garbage_output_appends_no_alerts() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "ddos_analyze.py", "echo 'not json at all'");
    let mut config = monitor_config(&dir);
    config.rate_threshold = 1000.0;
    let monitor = monitor_with(config);
    let baseline = monitor.alerts().len();

    flood(&monitor, "203.0.113.7", 20);
    monitor.run_tick().await;

    assert_eq!(monitor.alerts().len(), baseline);
}

// === Scenario B: XSS detection through the middleware =====================

#[tokio::test]
async fn script_payload_in_query_produces_one_xss_alert() {
    let dir = TempDir::new().unwrap();
    // Flag only candidates that actually carry script content
    write_script(
        &dir,
        "xss_analyze.py",
        r#"case "$1" in
  *script*) echo '{"is_attack": true, "confidence": 0.95, "attack_type": "reflected"}';;
  *) echo '{"is_attack": false, "confidence": 0.05}';;
esac"#,
    );
    write_script(&dir, "xss_save_detection.py", "echo '{}'");
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let baseline = monitor.alerts().len();
    let app = app(monitor.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/patients/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // No such business route; the monitored request still 404s normally
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let alerts: Vec<_> = monitor
        .alerts()
        .recent(100)
        .into_iter()
        .skip(baseline)
        .collect();
    assert_eq!(alerts.len(), 1, "exactly one detection for the query value");

    let alert = &alerts[0];
    assert_eq!(alert.class, AlertClass::Xss);
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.details["vector_type"], "query");
    assert_eq!(alert.details["vector_key"], "q");
    assert_eq!(alert.details["request_path"], "/patients/search");
    assert_eq!(alert.details["value_preview"], "<script>alert(1)</script>");
    assert!(alert.message.contains("query.q"));
}

#[tokio::test]
async fn long_payload_preview_is_truncated_with_ellipsis() {
    let dir = TempDir::new().unwrap();
    write_script(
        &dir,
        "xss_analyze.py",
        r#"echo '{"is_attack": true, "confidence": 0.9, "attack_type": "stored"}'"#,
    );
    write_script(&dir, "xss_save_detection.py", "echo '{}'");
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let baseline = monitor.alerts().len();
    let app = app(monitor.clone(), config);

    let long_value = "a".repeat(80);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/lookup?q={}", long_value))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let alerts: Vec<_> = monitor
        .alerts()
        .recent(100)
        .into_iter()
        .skip(baseline)
        .collect();
    let query_alert = alerts
        .iter()
        .find(|a| a.details["vector_type"] == "query")
        .expect("query candidate flagged");
    let preview = query_alert.details["value_preview"].as_str().unwrap();
    assert_eq!(preview.len(), 53);
    assert!(preview.ends_with("..."));
}

#[tokio::test]
async fn json_body_fields_are_scanned_and_handed_through() {
    let dir = TempDir::new().unwrap();
    write_script(
        &dir,
        "xss_analyze.py",
        r#"case "$1" in
  *script*) echo '{"is_attack": true, "confidence": 0.92, "attack_type": "stored"}';;
  *) echo '{"is_attack": false, "confidence": 0.05}';;
esac"#,
    );
    write_script(&dir, "xss_save_detection.py", "echo '{}'");
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let baseline = monitor.alerts().len();
    let app = app(monitor.clone(), config);

    let payload = r#"{"patient": {"notes": "<script>steal()</script>"}, "name": "benign name"}"#;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/records")
                .header("content-type", "application/json")
                .header("content-length", payload.len().to_string())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let alerts: Vec<_> = monitor
        .alerts()
        .recent(100)
        .into_iter()
        .skip(baseline)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].details["vector_type"], "body");
    assert_eq!(alerts[0].details["vector_key"], "patient.notes");
}

#[tokio::test]
async fn scanner_failure_never_blocks_the_request() {
    // No scripts at all: every candidate scoring attempt fails
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let baseline = monitor.alerts().len();
    let app = app(monitor.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/lookup?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(monitor.alerts().len(), baseline);
}

// === Middleware recording =================================================

#[tokio::test]
async fn monitored_request_is_recorded_and_completed() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let records = monitor.recorder().snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].src_ip, "198.51.100.4");
    assert_eq!(records[0].path, "/");
    assert_eq!(records[0].status_code, Some(200));
    assert!(records[0].response_time_ms.is_some());
}

#[tokio::test]
async fn skip_listed_paths_are_not_recorded() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor.clone(), config);

    for uri in ["/health", "/api/packets", "/ml/traffic/stats"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(monitor.recorder().is_empty());
}

// === API surface ==========================================================

#[tokio::test]
async fn alerts_api_returns_newest_last() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor.clone(), config);

    flood(&monitor, "203.0.113.7", 15);
    monitor.run_tick().await; // rule alert (scorer script missing is fine)
    monitor.stop_monitoring(); // info alert, newest

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ml/alerts?limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let alerts = body_json(response).await;
    let alerts = alerts.as_array().unwrap();
    assert!(alerts.len() >= 3);
    // Newest last: the stop notice is the final entry
    assert_eq!(alerts.last().unwrap()["message"], "DDoS monitoring stopped");
    let ids: Vec<u64> = alerts.iter().map(|a| a["id"].as_u64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn monitor_toggle_endpoints_flip_the_flag() {
    let dir = TempDir::new().unwrap();
    let mut config = monitor_config(&dir);
    config.auto_start = false;
    let monitor = Arc::new(SecurityMonitor::new(config.clone()));
    let app = app(monitor.clone(), config);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/ddos/monitor/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["isMonitoring"], true);
    assert!(monitor.is_monitoring());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/ddos/monitor/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["isMonitoring"], false);
    assert!(!monitor.is_monitoring());
}

#[tokio::test]
async fn dashboard_serves_stats_and_degrades_without_scorer() {
    let dir = TempDir::new().unwrap();
    write_script(
        &dir,
        "xss_stats.py",
        r#"echo '{"totalDetections": 3, "byType": {"reflected": 3}, "recentTimestamps": []}'"#,
    );
    // ddos_stats.py intentionally missing: that family serves its empty cache
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor, config);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ml/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let dashboard = body_json(response).await;
    assert_eq!(dashboard["xss"]["totalDetections"], 3);
    assert_eq!(dashboard["ddos"]["totalDetections"], 0);
    assert_eq!(dashboard["ddos"]["isMonitoring"], true);
    assert!(dashboard["alerts"].is_array());
}

#[tokio::test]
async fn analyze_endpoint_scores_and_validates() {
    let dir = TempDir::new().unwrap();
    write_script(
        &dir,
        "xss_analyze.py",
        r#"echo '{"is_attack": true, "confidence": 0.95, "attack_type": "reflected"}'"#,
    );
    write_script(&dir, "xss_save_detection.py", "echo '{}'");
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let baseline = monitor.alerts().len();
    let app = app(monitor.clone(), config);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/xss/analyze")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"payload": "<img src=x onerror=alert(1)>"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let verdict = body_json(response).await;
    assert_eq!(verdict["is_attack"], true);
    assert_eq!(verdict["attack_type"], "reflected");
    assert_eq!(monitor.alerts().len(), baseline + 1);

    // Missing payload is a client error
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/xss/analyze")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analyze_endpoint_surfaces_scorer_outage() {
    let dir = TempDir::new().unwrap();
    write_script(&dir, "xss_analyze.py", "exit 1");
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor, config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/xss/analyze")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"payload": "anything goes here"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn simulate_endpoint_validates_input() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor, config);

    for body in [
        r#"{"target_ip": "not-an-ip", "duration": 5}"#,
        r#"{"target_ip": "192.168.1.1", "duration": 99}"#,
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ml/simulate-dos")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn simulate_endpoint_injects_synthetic_flood() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(&dir);
    let monitor = monitor_with(config.clone());
    let app = app(monitor.clone(), config);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ml/simulate-dos")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"target_ip": "192.168.1.1", "duration": 1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    // Give the background generator a moment to produce records
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(monitor.recorder().len() > 10);
    let records = monitor.recorder().snapshot();
    // Index 0 is the POST itself; everything after is synthetic
    assert_eq!(records[1].dst_host, "192.168.1.1");
    assert_eq!(records[1].method, "HEAD");
}
