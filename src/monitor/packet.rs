//! Request packet recorder
//!
//! One normalized record per inbound HTTP request, kept in a bounded
//! in-memory ring. Recording is synchronous, in-memory only, and must never
//! fail the request path: every operation here is infallible and cheap.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Request-side metadata captured at arrival.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub src_ip: String,
    pub dst_host: String,
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub content_length: u64,
    /// Header map with `cookie` / `authorization` already filtered out.
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

/// One recorded request. Response fields are written exactly once, at
/// completion; the record is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub dst_host: String,
    pub protocol: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub content_length: u64,
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub query: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
}

/// Handle returned by [`PacketRecorder::record`], used to complete the same
/// record once the response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle(u64);

struct Ring {
    next_seq: u64,
    records: VecDeque<PacketRecord>,
}

/// Bounded ring buffer of [`PacketRecord`]s. Oldest records are evicted
/// first once the cap is reached; completion of an evicted record is a
/// logged no-op.
pub struct PacketRecorder {
    cap: usize,
    inner: Mutex<Ring>,
}

impl PacketRecorder {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            inner: Mutex::new(Ring {
                next_seq: 0,
                records: VecDeque::with_capacity(cap.max(1)),
            }),
        }
    }

    /// Append a record for an arriving request.
    pub fn record(&self, meta: RequestMeta) -> RecordHandle {
        let mut ring = self.inner.lock();
        let seq = ring.next_seq;
        ring.next_seq += 1;

        ring.records.push_back(PacketRecord {
            seq,
            timestamp: Utc::now(),
            src_ip: meta.src_ip,
            dst_host: meta.dst_host,
            protocol: "HTTP".to_string(),
            method: meta.method,
            path: meta.path,
            user_agent: meta.user_agent,
            content_length: meta.content_length,
            headers: meta.headers,
            query: meta.query,
            status_code: None,
            response_time_ms: None,
            response_size: None,
        });
        while ring.records.len() > self.cap {
            ring.records.pop_front();
        }

        RecordHandle(seq)
    }

    /// Fill in the response side of a record. Stale handles (the record was
    /// evicted before the response completed) are ignored.
    pub fn complete(&self, handle: RecordHandle, status: u16, latency_ms: u64, body_size: u64) {
        let mut ring = self.inner.lock();
        let front_seq = match ring.records.front() {
            Some(rec) => rec.seq,
            None => {
                tracing::debug!(seq = handle.0, "completion for empty recorder ignored");
                return;
            }
        };

        // Sequence numbers are contiguous, so the offset is a direct index.
        let Some(index) = handle.0.checked_sub(front_seq) else {
            tracing::debug!(seq = handle.0, "completion for evicted record ignored");
            return;
        };
        match ring.records.get_mut(index as usize) {
            Some(rec) => {
                rec.status_code = Some(status);
                rec.response_time_ms = Some(latency_ms);
                rec.response_size = Some(body_size);
            }
            None => {
                tracing::debug!(seq = handle.0, "completion for unknown record ignored");
            }
        }
    }

    /// Consistent copy of the current buffer, taken under a single lock.
    pub fn snapshot(&self) -> Vec<PacketRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    /// Last `n` records in insertion order.
    pub fn recent(&self, n: usize) -> Vec<PacketRecord> {
        let ring = self.inner.lock();
        let start = ring.records.len().saturating_sub(n);
        ring.records.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(src: &str, path: &str) -> RequestMeta {
        RequestMeta {
            src_ip: src.to_string(),
            dst_host: "localhost".to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_cap_is_never_exceeded() {
        let recorder = PacketRecorder::new(100);
        for i in 0..500 {
            recorder.record(meta("10.0.0.1", &format!("/p/{}", i)));
        }

        assert_eq!(recorder.len(), 100);
        // Oldest evicted first: the survivors are the last 100
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot[0].path, "/p/400");
        assert_eq!(snapshot[99].path, "/p/499");
    }

    #[test]
    fn test_complete_fills_response_fields() {
        let recorder = PacketRecorder::new(10);
        let handle = recorder.record(meta("10.0.0.1", "/a"));
        recorder.complete(handle, 200, 12, 512);

        let rec = &recorder.snapshot()[0];
        assert_eq!(rec.status_code, Some(200));
        assert_eq!(rec.response_time_ms, Some(12));
        assert_eq!(rec.response_size, Some(512));
    }

    #[test]
    fn test_complete_of_evicted_record_is_noop() {
        let recorder = PacketRecorder::new(2);
        let stale = recorder.record(meta("10.0.0.1", "/old"));
        recorder.record(meta("10.0.0.2", "/b"));
        recorder.record(meta("10.0.0.3", "/c"));

        // "/old" has been evicted; completing it must not touch survivors
        recorder.complete(stale, 500, 1, 1);
        for rec in recorder.snapshot() {
            assert_eq!(rec.status_code, None);
        }
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let recorder = PacketRecorder::new(10);
        for i in 0..5 {
            recorder.record(meta("10.0.0.1", &format!("/p/{}", i)));
        }

        let recent = recorder.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "/p/3");
        assert_eq!(recent[1].path, "/p/4");
    }
}
