//! `cli_pty` execution model adapter: wraps an external coding-agent CLI,
//! invoked through `SandboxRunner` so every command it runs is gated by
//! `PolicyGuard`. Builds an argv, runs it under a timeout, and translates
//! stdout/exit-code into a typed outcome rather than propagating process
//! errors as exceptions.

use crate::domain::models::{OutcomeClassification, Phase, PhaseOutcome, PhaseOutcomeBody, PolicyProfile};
use crate::domain::ports::{AdapterError, AgentAdapter, Feedback, TaskCtx};
use crate::services::policy_guard::PolicyGuard;
use crate::services::sandbox_runner::{ExitReason, ResourceCaps, SandboxRunner};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for invoking a CLI-based coding agent (binary path and
/// any fixed flags).
#[derive(Debug, Clone)]
pub struct CliPtyConfig {
    pub binary: String,
    pub fixed_args: Vec<String>,
    pub timeout: Duration,
}

pub struct CliPtyAdapter {
    id: String,
    config: CliPtyConfig,
    runner: Arc<SandboxRunner>,
    policy: Arc<PolicyGuard>,
    profile: PolicyProfile,
}

impl CliPtyAdapter {
    pub fn new(id: impl Into<String>, config: CliPtyConfig, runner: Arc<SandboxRunner>, policy: Arc<PolicyGuard>, profile: PolicyProfile) -> Self {
        Self { id: id.into(), config, runner, policy, profile }
    }

    fn build_argv(&self, phase: Phase, prompt: &str) -> Vec<String> {
        let mut argv = vec![self.config.binary.clone()];
        argv.extend(self.config.fixed_args.clone());
        argv.push("--print".into());
        argv.push(format!("[{}] {}", phase.as_str(), prompt));
        argv
    }

    async fn invoke(&self, phase: Phase, ctx: &TaskCtx, prompt: &str) -> Result<PhaseOutcome, AdapterError> {
        let argv = self.build_argv(phase, prompt);
        let caps = ResourceCaps::for_tier(crate::domain::models::SandboxTier::Medium);
        let handle = self
            .runner
            .run(&ctx.task_id, &ctx.workspace_root, &argv, &[], None, caps, &self.policy, &self.profile)
            .await
            .map_err(|e| AdapterError::Transient {
                adapter_id: self.id.clone(),
                message: e.to_string(),
            })?;
        let outcome = handle.wait(self.config.timeout).await;

        let classification = match outcome.exit_reason {
            ExitReason::Normal if outcome.exit_code == Some(0) => OutcomeClassification::Ok,
            ExitReason::Normal => OutcomeClassification::NeedsRefine,
            ExitReason::Timeout => OutcomeClassification::FailedTransient,
            ExitReason::Cancelled => OutcomeClassification::FailedPermanent,
            ExitReason::PolicyBlocked => OutcomeClassification::NeedsRefine,
            ExitReason::OutputCapExceeded => OutcomeClassification::FailedPermanent,
            ExitReason::KilledOverRss | ExitReason::Crashed => OutcomeClassification::FailedTransient,
        };

        let body = match phase {
            Phase::Plan => PhaseOutcomeBody::Plan { document: format!("plan from {}", self.id) },
            Phase::Code => PhaseOutcomeBody::PatchSet(crate::domain::models::PatchSet {
                phase_run_id: ctx.task_id.clone(),
                edits: vec![],
                precondition_sha: ctx.bound_commit_sha.clone(),
            }),
            Phase::Test => PhaseOutcomeBody::TestReport {
                passed: outcome.exit_code == Some(0),
                summary: format!("exit_code={:?}", outcome.exit_code),
            },
            Phase::Review => PhaseOutcomeBody::ReviewReport {
                approved: outcome.exit_code == Some(0),
                comments: String::new(),
            },
            Phase::Commit => PhaseOutcomeBody::CommitMessage { message: "chore: apply agent patch".into() },
            Phase::Deploy => PhaseOutcomeBody::DeployRecord { target: "default".into(), succeeded: outcome.exit_code == Some(0) },
        };

        Ok(PhaseOutcome {
            body,
            cost_actual: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            classification,
        })
    }
}

#[async_trait]
impl AgentAdapter for CliPtyAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn estimate_cost(&self, _phase: Phase, _context_digest: &str) -> Result<(f64, chrono::Duration), AdapterError> {
        Ok((0.0, chrono::Duration::from_std(self.config.timeout).unwrap_or_default()))
    }

    async fn propose(&self, phase: Phase, task_ctx: &TaskCtx, _prior_feedback: Option<&Feedback>) -> Result<PhaseOutcome, AdapterError> {
        self.invoke(phase, task_ctx, &task_ctx.goal).await
    }

    async fn refine(&self, phase: Phase, task_ctx: &TaskCtx, feedback: &Feedback) -> Result<PhaseOutcome, AdapterError> {
        self.invoke(phase, task_ctx, &feedback.summary).await
    }
}
