//! Injection scanning middleware
//!
//! Extracts string candidates from the request's surfaces and scores each
//! one through the external model before the business handler runs. The
//! scan is strictly best-effort: whatever happens, the request is passed
//! through to the inner handler.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::AppState;

use super::traffic::{header_map, parse_query};

pub async fn xss_scanner(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if state.monitor.should_skip(&path) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let query = parse_query(req.uri().query());
    let headers = header_map(&req);

    let (req, body) = buffer_json_body(req, state.monitor.config().max_scan_body_bytes).await;

    state
        .monitor
        .scan_request(&path, &method, &query, &headers, body.as_ref())
        .await;

    next.run(req).await
}

/// Buffer and parse a JSON body for scanning, handing the bytes back to the
/// inner handler untouched. Bodies without a JSON content type, without a
/// declared length, or larger than `limit` are left alone.
async fn buffer_json_body(req: Request, limit: usize) -> (Request, Option<Value>) {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let scannable = is_json && matches!(declared_len, Some(len) if len > 0 && len <= limit);
    if !scannable {
        if is_json && declared_len.map(|len| len > limit).unwrap_or(false) {
            tracing::debug!(limit, "request body too large to scan");
        }
        return (req, None);
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let parsed = serde_json::from_slice(&bytes).ok();
            (Request::from_parts(parts, Body::from(bytes)), parsed)
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer request body for scanning");
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}
