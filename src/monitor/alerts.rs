//! Security alert sink
//!
//! Bounded, append-only store shared by every detector in the pipeline.
//! Alerts are immutable once written; the sink keeps only the most recent
//! `cap` entries and evicts oldest-first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which part of the pipeline produced the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertClass {
    RuleBased,
    MlBased,
    Xss,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A detected anomalous condition. Created by the rule detector, the scorer
/// bridge or the content scanner; never mutated after `AlertSink::push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Time-seeded monotonic id, assigned by the sink at append time.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub class: AlertClass,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<String>,
}

impl Alert {
    pub fn new(class: AlertClass, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            class,
            severity,
            message: message.into(),
            details: Value::Null,
            confidence: None,
            attack_type: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_attack_type(mut self, attack_type: impl Into<String>) -> Self {
        self.attack_type = Some(attack_type.into());
        self
    }
}

/// Bounded FIFO alert store.
///
/// `recent(n)` returns the last `n` alerts in insertion order (newest last);
/// every read surface uses this one convention.
pub struct AlertSink {
    cap: usize,
    next_id: AtomicU64,
    inner: Mutex<VecDeque<Alert>>,
}

impl AlertSink {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            next_id: AtomicU64::new(Utc::now().timestamp_millis() as u64),
            inner: Mutex::new(VecDeque::with_capacity(cap.max(1))),
        }
    }

    /// Append an alert, evicting the oldest entries beyond the cap.
    /// Returns the stored alert with its assigned id.
    pub fn push(&self, mut alert: Alert) -> Alert {
        alert.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = alert.clone();

        let mut ring = self.inner.lock();
        ring.push_back(alert);
        while ring.len() > self.cap {
            ring.pop_front();
        }
        stored
    }

    /// Last `n` alerts, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Alert> {
        let ring = self.inner.lock();
        let start = ring.len().saturating_sub(n);
        ring.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
