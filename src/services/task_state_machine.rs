//! Per-task deterministic state machine driving plan→code→test→review→commit→
//! (deploy) with retry/iteration budget and failure classification.
//!
//! Every transition is committed to the `AuditStore` before the side
//! effects of the destination state begin ("write-ahead transition"); on
//! restart the FSM resumes from the latest durable state.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AuditEntry, AuditEventKind, MetaRecord, OutcomeClassification, PatchSet, Phase, PhaseOutcomeBody, PhaseRun,
    PolicyProfile, RunOutcome, Task, TaskStatus,
};
use crate::domain::ports::{AcceptancePredicate as _, AdapterError, AgentAdapter, AuditStore, Feedback, TaskCtx};
use crate::services::acceptance_predicates::PredicateRegistry;
use crate::services::agent_adapter::AdapterRegistry;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::overlay_broker::OverlayBroker;
use crate::services::patch_applier::{PatchApplier, PatchApplyError};
use crate::services::policy_guard::PolicyGuard;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsmError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("task cancelled")]
    Cancelled,
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("policy blocked: {0}")]
    PolicyBlocked(String),
}

const PLAN_MAX_ATTEMPTS: u32 = 2;

/// Static per-phase adapter routing table; a real deployment could extend
/// this with a dynamic rule keyed on estimated cost vs. remaining budget,
/// but a task always binds to a fixed routing decision at submission.
pub struct RoutingTable {
    pub by_phase: BTreeMap<Phase, String>,
}

pub struct TaskStateMachine {
    audit: Arc<dyn AuditStore>,
    policy: Arc<PolicyGuard>,
    overlay: Arc<OverlayBroker>,
    adapters: Arc<AdapterRegistry>,
    predicates: Arc<PredicateRegistry>,
    circuit_breaker: Arc<CircuitBreaker>,
    patch_applier: Arc<PatchApplier>,
    routing: RoutingTable,
    profile: PolicyProfile,
}

impl TaskStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        audit: Arc<dyn AuditStore>,
        policy: Arc<PolicyGuard>,
        overlay: Arc<OverlayBroker>,
        adapters: Arc<AdapterRegistry>,
        predicates: Arc<PredicateRegistry>,
        circuit_breaker: Arc<CircuitBreaker>,
        patch_applier: Arc<PatchApplier>,
        routing: RoutingTable,
        profile: PolicyProfile,
    ) -> Self {
        Self {
            audit,
            policy,
            overlay,
            adapters,
            predicates,
            circuit_breaker,
            patch_applier,
            routing,
            profile,
        }
    }

    async fn transition(&self, task: &mut Task, next: TaskStatus, causation_id: Option<String>) -> DomainResult<()> {
        let prior = task.status;
        let entry = AuditEntry::transition(task.id.clone(), prior.as_str(), next.as_str(), causation_id);
        self.audit.append(entry).await?;
        task.transition_to(next)?;
        self.overlay
            .publish_meta(
                &task.id,
                &MetaRecord::PhaseTransition { from: prior.as_str().to_string(), to: next.as_str().to_string() },
            )
            .await;
        Ok(())
    }

    fn adapter_for(&self, phase: Phase) -> Result<(Arc<dyn AgentAdapter>, crate::domain::models::AdapterDescriptor), FsmError> {
        let adapter_id = self
            .routing
            .by_phase
            .get(&phase)
            .ok_or_else(|| FsmError::Domain(DomainError::AdapterNotFound(phase.as_str().to_string())))?;
        let adapter = self.adapters.get(adapter_id).map_err(|_| FsmError::Domain(DomainError::AdapterNotFound(adapter_id.clone())))?;
        let descriptor = self
            .adapters
            .descriptor(adapter_id)
            .map_err(|_| FsmError::Domain(DomainError::AdapterNotFound(adapter_id.clone())))?
            .clone();
        Ok((adapter, descriptor))
    }

    /// Runs one phase attempt end to end: budget check, circuit-breaker
    /// gate, adapter call, and classification into the transition the FSM
    /// should take next.
    async fn run_phase(&self, task: &mut Task, phase: Phase, ctx: &TaskCtx, feedback: Option<&Feedback>) -> Result<PhaseRunOutcome, FsmError> {
        let (adapter, descriptor) = self.adapter_for(phase)?;

        if !self.circuit_breaker.allow_call(adapter.id()) {
            return Ok(PhaseRunOutcome::Classification(OutcomeClassification::FailedTransient));
        }

        let (est_cost, est_wall) = adapter
            .estimate_cost(phase, &ctx.goal)
            .await
            .unwrap_or((descriptor.cost_model.estimate(1, 1), chrono::Duration::seconds(1)));

        let elapsed = chrono::Utc::now().signed_duration_since(task.created_at);
        let decision = self
            .policy
            .check_budget(
                &task.id,
                &self.profile,
                &descriptor,
                (est_cost / descriptor.cost_model.rate_per_input_token.max(1e-9)) as u64,
                0,
                task.budgets.max_iterations,
                elapsed,
                est_wall,
                task.budgets.wall_time,
            )
            .await
            .map_err(|e| FsmError::PolicyBlocked(e.to_string()))?;

        if !decision.is_allowed() {
            return Err(FsmError::BudgetExceeded(format!("{decision:?}")));
        }

        let mut run = PhaseRun::new(task.id.clone(), phase, 1, adapter.id().to_string());
        self.audit
            .append(AuditEntry::metric(
                task.id.clone(),
                AuditEventKind::PhaseRunStarted,
                serde_json::json!({ "phase": phase.as_str(), "adapter_id": adapter.id() }),
            ))
            .await?;

        let call_result = match feedback {
            Some(fb) => adapter.refine(phase, ctx, fb).await,
            None => adapter.propose(phase, ctx, None).await,
        };

        match call_result {
            Ok(outcome) => {
                self.circuit_breaker.record_success(adapter.id());
                run.tokens_in = outcome.tokens_in;
                run.tokens_out = outcome.tokens_out;
                run.cost_usd = outcome.cost_actual;
                run.complete(classification_to_run_outcome(&outcome.classification));
                self.audit
                    .append(AuditEntry::metric(
                        task.id.clone(),
                        AuditEventKind::PhaseRunCompleted,
                        serde_json::json!({ "phase": phase.as_str(), "classification": outcome.classification }),
                    ))
                    .await?;
                Ok(PhaseRunOutcome::Body { classification: outcome.classification, body: outcome.body })
            }
            Err(AdapterError::Transient { .. }) => {
                self.circuit_breaker.record_failure(adapter.id());
                Ok(PhaseRunOutcome::Classification(OutcomeClassification::FailedTransient))
            }
            Err(AdapterError::Permanent { .. } | AdapterError::Malformed { .. }) => {
                self.circuit_breaker.record_failure(adapter.id());
                Ok(PhaseRunOutcome::Classification(OutcomeClassification::FailedPermanent))
            }
        }
    }

    /// Drives `task` from its current state to a terminal state, evaluating
    /// acceptance predicates named on the task against the workspace.
    pub async fn drive(&self, task: &mut Task, ctx: &mut TaskCtx, acceptance: &[String], workspace: &std::path::Path) -> Result<(), FsmError> {
        if task.status == TaskStatus::Pending {
            self.transition(task, TaskStatus::Planning, None).await?;
        }

        let mut plan_attempts = 0u32;
        let mut feedback: Option<Feedback> = None;
        let mut last_patch: Option<PatchSet> = None;

        loop {
            match task.status {
                TaskStatus::Planning => {
                    plan_attempts += 1;
                    match self.run_phase(task, Phase::Plan, ctx, feedback.as_ref()).await {
                        Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::Ok, .. }) => {
                            self.transition(task, TaskStatus::Coding, None).await?;
                            feedback = None;
                        }
                        Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::NeedsRefine, body }) => {
                            if plan_attempts >= PLAN_MAX_ATTEMPTS {
                                self.fail(task, "plan_max_attempts_exhausted").await?;
                                return Ok(());
                            }
                            feedback = Some(feedback_from_body(&body));
                        }
                        Ok(PhaseRunOutcome::Body { classification, .. }) | Ok(PhaseRunOutcome::Classification(classification)) => {
                            self.handle_failure_classification(task, classification, "planning").await?;
                            if task.status.is_terminal() {
                                return Ok(());
                            }
                        }
                        Err(e) => return self.handle_error(task, e).await,
                    }
                }
                TaskStatus::Coding => {
                    task.spent.iterations += 1;
                    if task.spent.iterations > task.budgets.max_iterations {
                        self.fail(task, "iteration_budget_exhausted").await?;
                        return Ok(());
                    }
                    match self.run_phase(task, Phase::Code, ctx, feedback.as_ref()).await {
                        Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::Ok, body }) => {
                            let patch = match body {
                                PhaseOutcomeBody::PatchSet(patch) => patch,
                                _ => PatchSet {
                                    phase_run_id: task.id.clone(),
                                    edits: vec![],
                                    precondition_sha: task.repo.commit_sha.clone(),
                                },
                            };
                            match self
                                .patch_applier
                                .apply(&task.id, &self.profile, workspace, &ctx.bound_commit_sha, &patch)
                                .await
                            {
                                Ok(()) => {
                                    last_patch = Some(patch);
                                    self.transition(task, TaskStatus::Testing, None).await?;
                                    feedback = None;
                                }
                                Err(e @ PatchApplyError::Conflict { .. }) => {
                                    self.fail(task, &format!("patch_conflict: {e}")).await?;
                                    return Ok(());
                                }
                                Err(e @ PatchApplyError::PolicyDenied(_)) => {
                                    self.fail(task, &format!("policy_blocked: {e}")).await?;
                                    return Ok(());
                                }
                                Err(e) => {
                                    feedback = Some(Feedback { summary: format!("patch application failed: {e}"), details: BTreeMap::new() });
                                }
                            }
                        }
                        Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::NeedsRefine, body }) => {
                            feedback = Some(feedback_from_body(&body));
                        }
                        Ok(PhaseRunOutcome::Body { classification, .. }) | Ok(PhaseRunOutcome::Classification(classification)) => {
                            self.handle_failure_classification(task, classification, "coding").await?;
                            if task.status.is_terminal() {
                                return Ok(());
                            }
                        }
                        Err(e) => return self.handle_error(task, e).await,
                    }
                }
                TaskStatus::Testing => {
                    let patch = last_patch.clone().unwrap_or_else(|| PatchSet {
                        phase_run_id: task.id.clone(),
                        edits: vec![],
                        precondition_sha: task.repo.commit_sha.clone(),
                    });
                    let results = self
                        .predicates
                        .evaluate_all(acceptance, workspace, &patch)
                        .await
                        .map_err(|e| FsmError::Domain(DomainError::PredicateNotFound(e.to_string())))?;
                    if results.iter().all(|r| r.passed) {
                        self.transition(task, TaskStatus::Reviewing, None).await?;
                    } else {
                        let summary = results.iter().filter(|r| !r.passed).map(|r| r.summary.clone()).collect::<Vec<_>>().join("; ");
                        feedback = Some(Feedback { summary, details: BTreeMap::new() });
                        self.transition(task, TaskStatus::Coding, None).await?;
                    }
                }
                TaskStatus::Reviewing => match self.run_phase(task, Phase::Review, ctx, feedback.as_ref()).await {
                    Ok(PhaseRunOutcome::Body { body: PhaseOutcomeBody::ReviewReport { approved: true, .. }, .. }) => {
                        self.transition(task, TaskStatus::CommitPending, None).await?;
                    }
                    Ok(PhaseRunOutcome::Body { body: PhaseOutcomeBody::ReviewReport { approved: false, comments }, .. }) => {
                        feedback = Some(Feedback { summary: comments, details: BTreeMap::new() });
                        self.transition(task, TaskStatus::Coding, None).await?;
                    }
                    Ok(PhaseRunOutcome::Body { classification, .. }) | Ok(PhaseRunOutcome::Classification(classification)) => {
                        self.handle_failure_classification(task, classification, "reviewing").await?;
                        if task.status.is_terminal() {
                            return Ok(());
                        }
                    }
                    Err(e) => return self.handle_error(task, e).await,
                },
                TaskStatus::CommitPending => match self.run_phase(task, Phase::Commit, ctx, None).await {
                    Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::Ok, .. }) => {
                        if task.deploy {
                            self.transition(task, TaskStatus::Deploying, None).await?;
                        } else {
                            self.succeed(task).await?;
                            return Ok(());
                        }
                    }
                    Ok(PhaseRunOutcome::Body { classification, .. }) | Ok(PhaseRunOutcome::Classification(classification)) => {
                        self.handle_failure_classification(task, classification, "commit_pending").await?;
                        if task.status.is_terminal() {
                            return Ok(());
                        }
                    }
                    Err(e) => return self.handle_error(task, e).await,
                },
                TaskStatus::Deploying => match self.run_phase(task, Phase::Deploy, ctx, None).await {
                    Ok(PhaseRunOutcome::Body { classification: OutcomeClassification::Ok, .. }) => {
                        self.succeed(task).await?;
                        return Ok(());
                    }
                    Ok(PhaseRunOutcome::Body { classification, .. }) | Ok(PhaseRunOutcome::Classification(classification)) => {
                        self.handle_failure_classification(task, classification, "deploying").await?;
                        return Ok(());
                    }
                    Err(e) => return self.handle_error(task, e).await,
                },
                TaskStatus::Suspended | TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled => return Ok(()),
            }
        }
    }

    async fn handle_failure_classification(&self, task: &mut Task, classification: OutcomeClassification, phase_label: &str) -> DomainResult<()> {
        match classification {
            OutcomeClassification::FailedTransient => {
                // bounded retry is handled by the caller re-entering the same state;
                // here we only fail permanently once the circuit breaker is open.
                Ok(())
            }
            _ => self.fail(task, &format!("adapter_permanent_in_{phase_label}")).await,
        }
    }

    async fn handle_error(&self, task: &mut Task, error: FsmError) -> Result<(), FsmError> {
        match &error {
            FsmError::BudgetExceeded(reason) => {
                self.overlay
                    .publish_meta(&task.id, &MetaRecord::BudgetWarning { dimension: reason.clone(), remaining: 0.0 })
                    .await;
                self.fail(task, "budget_exceeded").await?;
            }
            FsmError::PolicyBlocked(reason) => {
                self.overlay
                    .publish_meta(&task.id, &MetaRecord::PolicyDecision { allowed: false, reason: Some(reason.clone()) })
                    .await;
                self.fail(task, "policy_blocked").await?;
            }
            _ => {
                self.fail(task, "internal").await?;
            }
        }
        Ok(())
    }

    async fn fail(&self, task: &mut Task, reason: &str) -> DomainResult<()> {
        self.audit
            .append(AuditEntry::metric(task.id.clone(), AuditEventKind::TerminalOutcome, serde_json::json!({ "reason": reason })))
            .await?;
        self.transition(task, TaskStatus::Failed, None).await
    }

    async fn succeed(&self, task: &mut Task) -> DomainResult<()> {
        self.transition(task, TaskStatus::Succeeded, None).await?;
        self.overlay.close(&task.id, Some(0)).await;
        Ok(())
    }

    /// Cancellation takes precedence over any pending transition and is
    /// idempotent.
    pub async fn cancel(&self, task: &mut Task, reason: &str) -> DomainResult<()> {
        if task.status.is_terminal() {
            return Ok(());
        }
        self.audit
            .append(AuditEntry::metric(task.id.clone(), AuditEventKind::Cancelled, serde_json::json!({ "reason": reason })))
            .await?;
        self.transition(task, TaskStatus::Cancelled, None).await?;
        self.overlay.publish_meta(&task.id, &MetaRecord::Cancelled).await;
        self.overlay.close(&task.id, None).await;
        Ok(())
    }
}

enum PhaseRunOutcome {
    Body { classification: OutcomeClassification, body: PhaseOutcomeBody },
    Classification(OutcomeClassification),
}

fn classification_to_run_outcome(c: &OutcomeClassification) -> RunOutcome {
    match c {
        OutcomeClassification::Ok => RunOutcome::Ok,
        OutcomeClassification::NeedsRefine => RunOutcome::Retryable,
        OutcomeClassification::FailedTransient => RunOutcome::Retryable,
        OutcomeClassification::FailedPermanent => RunOutcome::Fatal,
    }
}

fn feedback_from_body(body: &PhaseOutcomeBody) -> Feedback {
    let summary = match body {
        PhaseOutcomeBody::Plan { document } => document.clone(),
        PhaseOutcomeBody::TestReport { summary, .. } => summary.clone(),
        PhaseOutcomeBody::ReviewReport { comments, .. } => comments.clone(),
        PhaseOutcomeBody::CommitMessage { message } => message.clone(),
        PhaseOutcomeBody::DeployRecord { target, .. } => target.clone(),
        PhaseOutcomeBody::PatchSet(_) => "patch needs refinement".to_string(),
    };
    Feedback { summary, details: BTreeMap::new() }
}
