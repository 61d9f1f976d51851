//! Traffic monitoring middleware
//!
//! Records one packet per inbound request at arrival and completes it after
//! the response is built, capturing status, latency and response size.
//! Recording is best-effort in-memory bookkeeping: nothing here can fail the
//! wrapped request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::{CONTENT_LENGTH, HOST, USER_AGENT},
    middleware::Next,
    response::Response,
};

use crate::monitor::xss::SENSITIVE_HEADERS;
use crate::monitor::RequestMeta;
use crate::AppState;

pub async fn traffic_monitor(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if state.monitor.should_skip(&path) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let handle = state.monitor.record_request(request_meta(&req, &path));

    let response = next.run(req).await;

    let latency_ms = started.elapsed().as_millis() as u64;
    state.monitor.recorder().complete(
        handle,
        response.status().as_u16(),
        latency_ms,
        response_size(&response),
    );

    response
}

fn request_meta(req: &Request, path: &str) -> RequestMeta {
    RequestMeta {
        src_ip: source_ip(req),
        dst_host: header_str(req, HOST.as_str()).unwrap_or_else(|| "localhost".to_string()),
        method: req.method().to_string(),
        path: path.to_string(),
        user_agent: header_str(req, USER_AGENT.as_str()),
        content_length: header_str(req, CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        headers: header_map(req),
        query: parse_query(req.uri().query()),
    }
}

/// Best-effort source resolution: explicit forwarding header first, then the
/// connection peer.
fn source_ip(req: &Request) -> String {
    if let Some(forwarded) = header_str(req, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_str(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// All request headers minus credentials, as owned strings.
pub(crate) fn header_map(req: &Request) -> HashMap<String, String> {
    req.headers()
        .iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub(crate) fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default()
}

/// Declared response size; streamed bodies without a length count as 0.
fn response_size(response: &Response) -> u64 {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = HttpRequest::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_header_wins_over_peer() {
        let mut req = request("/a", &[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        req.extensions_mut()
            .insert(ConnectInfo("127.0.0.1:9999".parse::<SocketAddr>().unwrap()));
        assert_eq!(source_ip(&req), "203.0.113.9");
    }

    #[test]
    fn test_peer_address_is_fallback() {
        let mut req = request("/a", &[]);
        req.extensions_mut()
            .insert(ConnectInfo("127.0.0.1:9999".parse::<SocketAddr>().unwrap()));
        assert_eq!(source_ip(&req), "127.0.0.1");

        let bare = request("/a", &[]);
        assert_eq!(source_ip(&bare), "unknown");
    }

    #[test]
    fn test_header_map_drops_credentials() {
        let req = request(
            "/a",
            &[
                ("authorization", "Bearer token"),
                ("cookie", "session=1"),
                ("user-agent", "test-agent"),
            ],
        );
        let headers = header_map(&req);
        assert!(!headers.contains_key("authorization"));
        assert!(!headers.contains_key("cookie"));
        assert_eq!(headers.get("user-agent").map(String::as_str), Some("test-agent"));
    }

    #[test]
    fn test_query_parsing() {
        let req = request("/search?q=hello%20world&page=2", &[]);
        let query = parse_query(req.uri().query());
        assert_eq!(query.get("q").map(String::as_str), Some("hello world"));
        assert_eq!(query.get("page").map(String::as_str), Some("2"));

        assert!(parse_query(None).is_empty());
    }
}
