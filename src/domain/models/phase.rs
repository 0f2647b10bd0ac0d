//! Phase and `PhaseRun` models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Code,
    Test,
    Review,
    Commit,
    Deploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Code => "code",
            Self::Test => "test",
            Self::Review => "review",
            Self::Commit => "commit",
            Self::Deploy => "deploy",
        }
    }
}

/// Terminal outcome of one `PhaseRun` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Ok,
    Retryable,
    Fatal,
    BudgetExceeded,
    PolicyBlocked,
    Timeout,
}

/// Reference to a content-addressed blob; the core stores only the
/// reference, never the blob bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub blob_id: String,
}

/// One attempt of one phase for one task.
///
/// Invariant: `(task_id, phase, attempt)` is unique; `attempt` n+1 only
/// exists if attempt n ended with `RunOutcome::Retryable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRun {
    pub task_id: String,
    pub phase: Phase,
    pub attempt: u32,
    pub adapter_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub artifacts: HashMap<String, ArtifactRef>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

impl PhaseRun {
    pub fn new(task_id: impl Into<String>, phase: Phase, attempt: u32, adapter_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase,
            attempt,
            adapter_id: adapter_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
            artifacts: HashMap::new(),
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
        }
    }

    pub fn complete(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.ended_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// The tagged result of an `AgentAdapter::propose`/`refine` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClassification {
    Ok,
    NeedsRefine,
    FailedTransient,
    FailedPermanent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseOutcomeBody {
    PatchSet(crate::domain::models::patch_set::PatchSet),
    Plan { document: String },
    TestReport { passed: bool, summary: String },
    ReviewReport { approved: bool, comments: String },
    CommitMessage { message: String },
    DeployRecord { target: String, succeeded: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub body: PhaseOutcomeBody,
    pub cost_actual: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub classification: OutcomeClassification,
}
