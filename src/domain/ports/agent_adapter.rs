//! Port for the uniform facade over heterogeneous external coding agents.

use crate::domain::models::{Phase, PhaseOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Read-only bundle handed to an adapter for one phase call. Adapters MUST
/// confine filesystem writes to `workspace_root` and MUST NOT spawn
/// background processes outliving the call.
#[derive(Debug, Clone)]
pub struct TaskCtx {
    pub task_id: String,
    pub workspace_root: std::path::PathBuf,
    pub bound_commit_sha: String,
    pub goal: String,
    pub acceptance_criteria_summary: String,
    pub policy_profile_name: String,
    pub remaining_budget_cost_usd: f64,
    pub remaining_iterations: u32,
}

/// Feedback carried from a failed acceptance check, policy denial, or
/// review rejection into the next `refine` call.
#[derive(Debug, Clone)]
pub struct Feedback {
    pub summary: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter {adapter_id} transient failure: {message}")]
    Transient { adapter_id: String, message: String },

    #[error("adapter {adapter_id} permanent failure: {message}")]
    Permanent { adapter_id: String, message: String },

    #[error("adapter {adapter_id} returned a malformed phase outcome: {message}")]
    Malformed { adapter_id: String, message: String },
}

/// Uniform contract over heterogeneous external coding agents so the
/// `TaskStateMachine`'s phase logic is adapter-agnostic.
///
/// Every adapter implements the subset of phases it declares in its
/// `AdapterDescriptor::capabilities`; calling an unsupported phase is a
/// logic error in the caller, not a recoverable adapter failure.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn id(&self) -> &str;

    /// Pure, side-effect free; used by `PolicyGuard::check_budget`.
    async fn estimate_cost(&self, phase: Phase, context_digest: &str) -> Result<(f64, chrono::Duration), AdapterError>;

    async fn propose(
        &self,
        phase: Phase,
        task_ctx: &TaskCtx,
        prior_feedback: Option<&Feedback>,
    ) -> Result<PhaseOutcome, AdapterError>;

    async fn refine(&self, phase: Phase, task_ctx: &TaskCtx, feedback: &Feedback) -> Result<PhaseOutcome, AdapterError>;
}
