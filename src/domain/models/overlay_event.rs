//! `OverlayEvent` — one chunk of captured PTY output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
    Meta,
}

/// Closed discriminator set for `META` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetaRecord {
    ProcessStart { argv: Vec<String> },
    ProcessExit { exit_code: Option<i32> },
    PolicyDecision { allowed: bool, reason: Option<String> },
    BudgetWarning { dimension: String, remaining: f64 },
    PhaseTransition { from: String, to: String },
    Cancelled,
    SlowConsumer,
}

/// One chunk of captured PTY output. Per task, sequence numbers are
/// gap-free and monotonic starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEvent {
    pub task_id: String,
    pub seq: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub stream: Stream,
    /// Opaque bytes for stdout/stderr; for `Meta`, a serialized `MetaRecord`.
    pub payload: Vec<u8>,
}

impl OverlayEvent {
    pub fn meta(task_id: impl Into<String>, seq: u64, record: &MetaRecord) -> Self {
        Self {
            task_id: task_id.into(),
            seq,
            timestamp: chrono::Utc::now(),
            stream: Stream::Meta,
            payload: serde_json::to_vec(record).expect("MetaRecord always serializes"),
        }
    }

    pub fn chunk(task_id: impl Into<String>, seq: u64, stream: Stream, payload: Vec<u8>) -> Self {
        Self {
            task_id: task_id.into(),
            seq,
            timestamp: chrono::Utc::now(),
            stream,
            payload,
        }
    }
}
