//! Synchronous decision point consulted on every shell command, file write,
//! network-egress target, and adapter invocation.
//!
//! Atomic `fetch_update` CAS loops guard budget counters against TOCTOU
//! races between concurrent callers, and decisions are plain tagged
//! results rather than exceptions.

use crate::domain::models::{AdapterDescriptor, AuditEntry, AuditEventKind, PolicyProfile};
use crate::domain::ports::AuditStore;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("command denied: {0}")]
    CommandDenied(String),
    #[error("write denied outside scope: {0:?}")]
    WriteDenied(Vec<PathBuf>),
    #[error("egress denied for host: {0}")]
    EgressDenied(String),
    #[error("budget denied: {0}")]
    BudgetDenied(String),
    #[error("audit store unavailable: {0}")]
    AuditUnavailable(#[from] crate::domain::errors::DomainError),
}

#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Per-task running cost/iteration/wall-time counters, checked with a CAS
/// loop so concurrent phase calls can never both pass a check that, taken
/// together, would blow the budget.
#[derive(Debug, Default)]
struct TaskBudgetState {
    spent_cost_micros: AtomicU64,
    spent_iterations: AtomicU64,
}

impl TaskBudgetState {
    /// Atomically checks whether `projected_micros` more cost would exceed
    /// `ceiling_micros`; if not, records it. Returns the new total on
    /// success, or the current total (unchanged) on denial.
    fn check_and_record_cost(&self, projected_micros: u64, ceiling_micros: u64) -> Result<u64, u64> {
        self.spent_cost_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current + projected_micros;
                if next > ceiling_micros {
                    None
                } else {
                    Some(next)
                }
            })
            .map(|prev| prev + projected_micros)
    }

    fn check_and_record_iteration(&self, max_iterations: u64) -> Result<u64, u64> {
        self.spent_iterations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current + 1 > max_iterations {
                    None
                } else {
                    Some(current + 1)
                }
            })
            .map(|prev| prev + 1)
    }
}

pub struct PolicyGuard {
    audit: Arc<dyn AuditStore>,
    budgets: std::sync::Mutex<HashMap<String, Arc<TaskBudgetState>>>,
}

impl PolicyGuard {
    pub fn new(audit: Arc<dyn AuditStore>) -> Self {
        Self {
            audit,
            budgets: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn budget_state(&self, task_id: &str) -> Arc<TaskBudgetState> {
        let mut guard = self.budgets.lock().expect("budget mutex poisoned");
        guard
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(TaskBudgetState::default()))
            .clone()
    }

    async fn record(&self, task_id: &str, allowed: bool, reason: Option<String>) -> Result<(), PolicyError> {
        let entry = AuditEntry::metric(
            task_id,
            AuditEventKind::PolicyDecision,
            serde_json::json!({ "allowed": allowed, "reason": reason }),
        );
        self.audit.append(entry).await?;
        Ok(())
    }

    /// Matching discipline: the first allow-pattern that matches the joined
    /// argv string permits; if none match, deny. Patterns are anchored
    /// regular expressions; earlier patterns win; deny is the default.
    pub async fn check_command(&self, task_id: &str, profile: &PolicyProfile, argv: &[String]) -> Result<Decision, PolicyError> {
        if argv.is_empty() {
            self.record(task_id, false, Some("empty argv".into())).await?;
            return Ok(Decision::Deny("empty argv".into()));
        }
        let joined = argv.join(" ");
        for pattern in &profile.command_allow_patterns {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(&joined) => {
                    self.record(task_id, true, None).await?;
                    return Ok(Decision::Allow);
                }
                _ => continue,
            }
        }
        let reason = format!("no allow-pattern matched: {joined}");
        self.record(task_id, false, Some(reason.clone())).await?;
        Ok(Decision::Deny(reason))
    }

    /// Symlink resolution is performed before matching; the resolved
    /// absolute path is what gets checked against the write-scope prefixes.
    /// A single out-of-scope path denies the whole set.
    pub async fn check_write(&self, task_id: &str, profile: &PolicyProfile, paths: &[PathBuf]) -> Result<Decision, PolicyError> {
        let mut outside = Vec::new();
        for path in paths {
            let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            let in_scope = profile
                .write_scope
                .iter()
                .any(|prefix| resolved.starts_with(Path::new(prefix)));
            if !in_scope {
                outside.push(resolved);
            }
        }
        if outside.is_empty() {
            self.record(task_id, true, None).await?;
            Ok(Decision::Allow)
        } else {
            let reason = format!("paths outside write scope: {outside:?}");
            self.record(task_id, false, Some(reason.clone())).await?;
            Ok(Decision::Deny(reason))
        }
    }

    /// Host must match an allow-pattern: exact match or suffix glob
    /// (`*.example.com`).
    pub async fn check_egress(&self, task_id: &str, profile: &PolicyProfile, host: &str) -> Result<Decision, PolicyError> {
        let allowed = profile.egress_allow_list.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{suffix}"))
            } else {
                host == pattern
            }
        });
        if allowed {
            self.record(task_id, true, None).await?;
            Ok(Decision::Allow)
        } else {
            let reason = format!("host not in egress allow-list: {host}");
            self.record(task_id, false, Some(reason.clone())).await?;
            Ok(Decision::Deny(reason))
        }
    }

    /// Denies if spending `projected_cost` more would exceed the task's
    /// cost budget, if the next iteration would exceed `max_iterations`, or
    /// if `projected_wall` would push total wall time past the budget.
    /// Projected cost is scaled by the profile's safety multiplier.
    #[allow(clippy::too_many_arguments)]
    pub async fn check_budget(
        &self,
        task_id: &str,
        profile: &PolicyProfile,
        adapter: &AdapterDescriptor,
        tokens_in: u64,
        tokens_out: u64,
        max_iterations: u32,
        elapsed: chrono::Duration,
        projected_wall: chrono::Duration,
        wall_budget: chrono::Duration,
    ) -> Result<Decision, PolicyError> {
        let raw_cost = adapter.cost_model.estimate(tokens_in, tokens_out);
        let projected_cost = raw_cost * profile.safety_multiplier;
        let ceiling = profile.per_task_cost_ceiling.min(profile.per_task_cost_ceiling);
        let state = self.budget_state(task_id);

        let projected_micros = (projected_cost * 1_000_000.0).round() as u64;
        let ceiling_micros = (ceiling * 1_000_000.0).round() as u64;

        if state.check_and_record_cost(projected_micros, ceiling_micros).is_err() {
            let reason = "projected cost would exceed task cost budget".to_string();
            self.record(task_id, false, Some(reason.clone())).await?;
            return Ok(Decision::Deny(reason));
        }
        if state.check_and_record_iteration(max_iterations as u64).is_err() {
            let reason = "next iteration would exceed max_iterations".to_string();
            self.record(task_id, false, Some(reason.clone())).await?;
            return Ok(Decision::Deny(reason));
        }
        if elapsed + projected_wall > wall_budget {
            let reason = "projected wall time would exceed task wall_time budget".to_string();
            self.record(task_id, false, Some(reason.clone())).await?;
            return Ok(Decision::Deny(reason));
        }
        self.record(task_id, true, None).await?;
        Ok(Decision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Capability, CostModel, ExecutionModel, SandboxTier};
    use crate::infrastructure::database::InMemoryAuditStore;
    use std::collections::BTreeSet;

    fn profile() -> PolicyProfile {
        PolicyProfile {
            name: "default".into(),
            version: 1,
            command_allow_patterns: vec!["^git (status|diff)$".to_string()],
            write_scope: vec![std::env::temp_dir().to_string_lossy().to_string()],
            egress_allow_list: vec!["*.example.com".to_string()],
            per_call_cost_ceiling: 1.0,
            per_task_cost_ceiling: 0.01,
            sandbox_tier: SandboxTier::Medium,
            safety_multiplier: 1.2,
        }
    }

    fn adapter() -> AdapterDescriptor {
        AdapterDescriptor {
            id: "mock".into(),
            capabilities: BTreeSet::from([Capability::Propose]),
            execution_model: ExecutionModel::InProcess,
            default_policy_profile: "default".into(),
            cost_model: CostModel {
                rate_per_input_token: 0.00002,
                rate_per_output_token: 0.00002,
            },
        }
    }

    #[tokio::test]
    async fn allowed_command_matches_first_pattern() {
        let guard = PolicyGuard::new(Arc::new(InMemoryAuditStore::new()));
        let decision = guard.check_command("t1", &profile(), &["git".into(), "status".into()]).await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn unmatched_command_denies() {
        let guard = PolicyGuard::new(Arc::new(InMemoryAuditStore::new()));
        let decision = guard.check_command("t1", &profile(), &["rm".into(), "-rf".into(), "/tmp/x".into()]).await.unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn empty_argv_denies() {
        let guard = PolicyGuard::new(Arc::new(InMemoryAuditStore::new()));
        let decision = guard.check_command("t1", &profile(), &[]).await.unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn egress_suffix_glob_matches() {
        let guard = PolicyGuard::new(Arc::new(InMemoryAuditStore::new()));
        let decision = guard.check_egress("t1", &profile(), "api.example.com").await.unwrap();
        assert!(decision.is_allowed());
        let denied = guard.check_egress("t1", &profile(), "evil.test").await.unwrap();
        assert!(!denied.is_allowed());
    }

    #[tokio::test]
    async fn policy_decisions_are_recorded_against_the_calling_task_id() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let guard = PolicyGuard::new(audit.clone());
        guard.check_command("task-42", &profile(), &["git".into(), "status".into()]).await.unwrap();
        let entries = audit.scan("task-42", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditEventKind::PolicyDecision);
        let other = audit.scan("default", None).await.unwrap();
        assert!(other.is_empty(), "decision must not be keyed by the profile name");
    }

    #[tokio::test]
    async fn zero_cost_budget_denies_first_call() {
        let guard = PolicyGuard::new(Arc::new(InMemoryAuditStore::new()));
        let mut p = profile();
        p.per_task_cost_ceiling = 0.0;
        let decision = guard
            .check_budget("t1", &p, &adapter(), 1000, 1000, 3, chrono::Duration::zero(), chrono::Duration::seconds(1), chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn concurrent_budget_checks_never_overspend() {
        let guard = Arc::new(PolicyGuard::new(Arc::new(InMemoryAuditStore::new())));
        let mut p = profile();
        p.per_task_cost_ceiling = 0.001; // only a couple of calls should pass
        let p = Arc::new(p);
        let a = Arc::new(adapter());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let guard = guard.clone();
            let p = p.clone();
            let a = a.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .check_budget("concurrent-task", &p, &a, 10, 10, 100, chrono::Duration::zero(), chrono::Duration::seconds(1), chrono::Duration::minutes(5))
                    .await
                    .unwrap()
                    .is_allowed()
            }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        let state = guard.budget_state("concurrent-task");
        let spent = state.spent_cost_micros.load(Ordering::SeqCst);
        let ceiling_micros = (p.per_task_cost_ceiling * 1_000_000.0).round() as u64;
        assert!(spent <= ceiling_micros, "spent {spent} exceeded ceiling {ceiling_micros} after {allowed} allowed calls");
    }
}
