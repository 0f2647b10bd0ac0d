//! `AuditEntry` — one append-only state-transition or metric record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Created,
    StateTransition,
    PolicyDecision,
    BudgetEvent,
    PhaseRunStarted,
    PhaseRunCompleted,
    OverlaySegmentPersisted,
    Cancelled,
    TerminalOutcome,
}

/// Append-only; never mutated after construction (enforced by the store,
/// not the type — see `AuditStore::append`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub task_id: String,
    /// Monotonic per task, assigned by the store on append; `0` before
    /// the entry has been appended.
    #[serde(default)]
    pub seq: i64,
    pub kind: AuditEventKind,
    pub prior_state: Option<String>,
    pub next_state: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    /// Links to the `PhaseRun` or `OverlayEvent` that caused this entry.
    pub causation_id: Option<String>,
}

impl AuditEntry {
    pub fn transition(task_id: impl Into<String>, prior: &str, next: &str, causation_id: Option<String>) -> Self {
        Self {
            task_id: task_id.into(),
            seq: 0,
            kind: AuditEventKind::StateTransition,
            prior_state: Some(prior.to_string()),
            next_state: Some(next.to_string()),
            payload: Value::Null,
            timestamp: Utc::now(),
            causation_id,
        }
    }

    pub fn metric(task_id: impl Into<String>, kind: AuditEventKind, payload: Value) -> Self {
        Self {
            task_id: task_id.into(),
            seq: 0,
            kind,
            prior_state: None,
            next_state: None,
            payload,
            timestamp: Utc::now(),
            causation_id: None,
        }
    }
}
