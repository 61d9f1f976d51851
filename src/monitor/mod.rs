//! Traffic monitoring and anomaly detection pipeline
//!
//! Every inbound request flows through the recorder; a periodic tick
//! aggregates the trailing window, runs the rule-based detector and, when
//! traffic is heavy, hands a feature vector to the external scoring model.
//! An independent per-request scanner checks string surfaces for injection
//! content against the same scorer contract. Both paths write to one shared
//! bounded alert sink.

pub mod alerts;
pub mod cache;
pub mod detector;
pub mod engine;
pub mod features;
pub mod packet;
pub mod scorer;
pub mod stats;
pub mod xss;

pub use alerts::{Alert, AlertClass, AlertSink, Severity};
pub use cache::DetectionStats;
pub use engine::{MonitorConfig, SecurityMonitor};
pub use features::TrafficFeatures;
pub use packet::{PacketRecord, PacketRecorder, RecordHandle, RequestMeta};
pub use scorer::{ScorerBridge, ScorerConfig, ScorerError, Verdict};
pub use stats::{aggregate, TrafficStats};
