//! In-process deterministic adapter used by tests and local development.

use crate::domain::models::{ChangeType, FileEdit, OutcomeClassification, Phase, PhaseOutcome, PhaseOutcomeBody, PatchSet};
use crate::domain::ports::{AdapterError, AgentAdapter, Feedback, TaskCtx};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

/// Always succeeds on the first attempt unless configured with
/// `fail_n_times`, in which case it returns `NeedsRefine` that many times
/// before succeeding — useful for exercising the refine loop deterministically.
pub struct MockAdapter {
    id: String,
    fail_n_times: u32,
    attempts: AtomicU32,
}

impl MockAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fail_n_times: 0,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn failing(id: impl Into<String>, fail_n_times: u32) -> Self {
        Self {
            id: id.into(),
            fail_n_times,
            attempts: AtomicU32::new(0),
        }
    }

    /// A self-contained, `git apply`-able diff that creates a one-line file;
    /// real adapters return an opaque diff produced by the underlying model,
    /// this is the deterministic stand-in used by tests.
    const MOCK_PATCH_DIFF: &'static [u8] = b"--- /dev/null\n+++ b/mock_change.txt\n@@ -0,0 +1 @@\n+mock change\n";

    fn outcome_for(&self, phase: Phase, task_ctx: &crate::domain::ports::TaskCtx) -> PhaseOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let classification = if attempt < self.fail_n_times {
            OutcomeClassification::NeedsRefine
        } else {
            OutcomeClassification::Ok
        };
        let body = match phase {
            Phase::Plan => PhaseOutcomeBody::Plan { document: "mock plan".into() },
            Phase::Code => PhaseOutcomeBody::PatchSet(PatchSet {
                phase_run_id: task_ctx.task_id.clone(),
                edits: vec![FileEdit {
                    path: "mock_change.txt".into(),
                    change_type: ChangeType::Created,
                    diff: Self::MOCK_PATCH_DIFF.to_vec(),
                }],
                precondition_sha: task_ctx.bound_commit_sha.clone(),
            }),
            Phase::Test => PhaseOutcomeBody::TestReport { passed: classification == OutcomeClassification::Ok, summary: "mock tests".into() },
            Phase::Review => PhaseOutcomeBody::ReviewReport { approved: classification == OutcomeClassification::Ok, comments: "looks fine".into() },
            Phase::Commit => PhaseOutcomeBody::CommitMessage { message: "fix: mock commit".into() },
            Phase::Deploy => PhaseOutcomeBody::DeployRecord { target: "mock".into(), succeeded: true },
        };
        PhaseOutcome {
            body,
            cost_actual: 0.001,
            tokens_in: 100,
            tokens_out: 100,
            classification,
        }
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn estimate_cost(&self, _phase: Phase, _context_digest: &str) -> Result<(f64, chrono::Duration), AdapterError> {
        Ok((0.001, chrono::Duration::seconds(1)))
    }

    async fn propose(&self, phase: Phase, task_ctx: &TaskCtx, _prior_feedback: Option<&Feedback>) -> Result<PhaseOutcome, AdapterError> {
        Ok(self.outcome_for(phase, task_ctx))
    }

    async fn refine(&self, phase: Phase, task_ctx: &TaskCtx, _feedback: &Feedback) -> Result<PhaseOutcome, AdapterError> {
        Ok(self.outcome_for(phase, task_ctx))
    }
}
