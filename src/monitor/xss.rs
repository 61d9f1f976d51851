//! Injection-candidate extraction
//!
//! Pulls every string a request could smuggle script content through:
//! query parameter values, recursively flattened JSON body fields, header
//! values (minus credentials) and path segments. Each candidate is scored
//! individually by the external model; this module only extracts.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Preview length used in alert messages and details.
pub const PREVIEW_MAX: usize = 50;

/// Headers that are never scanned or recorded.
pub const SENSITIVE_HEADERS: [&str; 2] = ["cookie", "authorization"];

/// Which request surface a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    Query,
    Body,
    Header,
    Path,
}

impl VectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Query => "query",
            VectorKind::Body => "body",
            VectorKind::Header => "header",
            VectorKind::Path => "path",
        }
    }
}

/// One string extracted from a request surface.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: VectorKind,
    pub key: String,
    pub value: String,
}

/// Extract scan candidates from one request's surfaces.
///
/// Candidates shorter than `min_len` are dropped (trivial tokens are noise);
/// at most `max` candidates are returned per request.
pub fn extract_candidates(
    path: &str,
    query: &HashMap<String, String>,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    min_len: usize,
    max: usize,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (key, value) in query {
        candidates.push(Candidate {
            kind: VectorKind::Query,
            key: key.clone(),
            value: value.clone(),
        });
    }

    if let Some(body) = body {
        flatten_body("", body, &mut candidates);
    }

    for (key, value) in headers {
        if SENSITIVE_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
            continue;
        }
        candidates.push(Candidate {
            kind: VectorKind::Header,
            key: key.clone(),
            value: value.clone(),
        });
    }

    for (i, segment) in path.split('/').enumerate() {
        if !segment.is_empty() {
            candidates.push(Candidate {
                kind: VectorKind::Path,
                key: format!("segment_{}", i),
                value: segment.to_string(),
            });
        }
    }

    candidates.retain(|c| c.value.len() >= min_len);
    if candidates.len() > max {
        tracing::debug!(
            dropped = candidates.len() - max,
            "per-request candidate cap reached"
        );
        candidates.truncate(max);
    }
    candidates
}

/// Walk a JSON body, collecting every string leaf under a dotted key.
fn flatten_body(prefix: &str, value: &Value, out: &mut Vec<Candidate>) {
    match value {
        Value::String(s) => out.push(Candidate {
            kind: VectorKind::Body,
            key: prefix.to_string(),
            value: s.clone(),
        }),
        Value::Object(map) => {
            for (key, nested) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_body(&key, nested, out);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                let key = if prefix.is_empty() {
                    i.to_string()
                } else {
                    format!("{}.{}", prefix, i)
                };
                flatten_body(&key, nested, out);
            }
        }
        _ => {}
    }
}

/// Truncate a candidate value for human-readable output; an ellipsis marks
/// truncation.
pub fn preview(value: &str) -> String {
    if value.chars().count() > PREVIEW_MAX {
        let cut: String = value.chars().take(PREVIEW_MAX).collect();
        format!("{}...", cut)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extracts_from_every_surface() {
        let query = map(&[("search", "<script>alert(1)</script>")]);
        let headers = map(&[("user-agent", "Mozilla/5.0 (compatible)")]);
        let body = json!({"name": "Charlie Nguyen"});

        let candidates =
            extract_candidates("/patients/lookup", &query, &headers, Some(&body), 5, 32);

        let kinds: Vec<VectorKind> = candidates.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&VectorKind::Query));
        assert!(kinds.contains(&VectorKind::Body));
        assert!(kinds.contains(&VectorKind::Header));
        assert!(kinds.contains(&VectorKind::Path));
    }

    #[test]
    fn test_short_candidates_are_dropped() {
        let query = map(&[("q", "hi"), ("name", "long enough value")]);
        let candidates =
            extract_candidates("/", &query, &HashMap::new(), None, 5, 32);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "name");
    }

    #[test]
    fn test_sensitive_headers_are_skipped() {
        let headers = map(&[
            ("Authorization", "Bearer secret-token-value"),
            ("Cookie", "session=abcdef123456"),
            ("x-request-id", "req-12345-abcdef"),
        ]);
        let candidates =
            extract_candidates("/", &HashMap::new(), &headers, None, 5, 32);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "x-request-id");
    }

    #[test]
    fn test_nested_body_fields_get_dotted_keys() {
        let body = json!({
            "patient": {"notes": "<img src=x onerror=alert(1)>"},
            "tags": ["benign tag", {"label": "nested label"}]
        });
        let candidates =
            extract_candidates("/", &HashMap::new(), &HashMap::new(), Some(&body), 5, 32);

        let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
        assert!(keys.contains(&"patient.notes"));
        assert!(keys.contains(&"tags.0"));
        assert!(keys.contains(&"tags.1.label"));
    }

    #[test]
    fn test_candidate_cap() {
        let query: HashMap<String, String> = (0..100)
            .map(|i| (format!("k{}", i), format!("value number {}", i)))
            .collect();
        let candidates = extract_candidates("/", &query, &HashMap::new(), None, 5, 32);
        assert_eq!(candidates.len(), 32);
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let long = "a".repeat(80);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_MAX + 3);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short"), "short");
    }
}
