//! Registry of named acceptance predicates plus opaque-argv wrappers that
//! shell out through `SandboxRunner`: cheap/blocking predicates run first
//! and short-circuit the rest.

use crate::domain::models::{PatchSet, PolicyProfile, SandboxTier};
use crate::domain::ports::{AcceptancePredicate, PredicateResult};
use crate::services::policy_guard::PolicyGuard;
use crate::services::sandbox_runner::{ResourceCaps, SandboxRunner};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("predicate {0} not registered")]
    NotFound(String),
}

/// A predicate that invokes a caller-configured external command and
/// treats a zero exit code as passing. Never shells out to a hardcoded
/// toolchain; the command is opaque argv supplied via `AcceptanceCriterion::args`.
pub struct CommandPredicate {
    name: String,
    argv: Vec<String>,
    blocking: bool,
    runner: Arc<SandboxRunner>,
    policy: Arc<PolicyGuard>,
    profile: PolicyProfile,
}

impl CommandPredicate {
    pub fn new(
        name: impl Into<String>,
        argv: Vec<String>,
        blocking: bool,
        runner: Arc<SandboxRunner>,
        policy: Arc<PolicyGuard>,
        profile: PolicyProfile,
    ) -> Self {
        Self { name: name.into(), argv, blocking, runner, policy, profile }
    }
}

#[async_trait]
impl AcceptancePredicate for CommandPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn evaluate(&self, workspace: &Path, _patch: &PatchSet) -> PredicateResult {
        if self.argv.is_empty() {
            return PredicateResult {
                passed: false,
                summary: "no command configured for predicate".into(),
                artifacts: vec![],
            };
        }
        let caps = ResourceCaps::for_tier(SandboxTier::Low);
        let run = self
            .runner
            .run("predicate", workspace, &self.argv, &[], None, caps, &self.policy, &self.profile)
            .await;
        match run {
            Ok(handle) => {
                let outcome = handle.wait(caps.wall_time).await;
                PredicateResult {
                    passed: outcome.exit_code == Some(0),
                    summary: format!("{}: exit_code={:?}", self.name, outcome.exit_code),
                    artifacts: vec![],
                }
            }
            Err(e) => PredicateResult {
                passed: false,
                summary: format!("{}: failed to spawn: {e}", self.name),
                artifacts: vec![],
            },
        }
    }
}

/// In-process registry; cheap/blocking predicates are evaluated before
/// expensive ones, and a blocking failure skips the rest.
#[derive(Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<dyn AcceptancePredicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, predicate: Arc<dyn AcceptancePredicate>) {
        self.predicates.insert(predicate.name().to_string(), predicate);
    }

    /// Evaluates `names` in the order given, blocking predicates first.
    /// Returns as soon as a blocking predicate fails; otherwise runs all
    /// and returns every result.
    pub async fn evaluate_all(
        &self,
        names: &[String],
        workspace: &Path,
        patch: &PatchSet,
    ) -> Result<Vec<PredicateResult>, PredicateError> {
        let mut predicates = Vec::with_capacity(names.len());
        for name in names {
            predicates.push(self.predicates.get(name).ok_or_else(|| PredicateError::NotFound(name.clone()))?);
        }
        predicates.sort_by_key(|p| !p.is_blocking());

        let mut results = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            let result = predicate.evaluate(workspace, patch).await;
            let blocked = predicate.is_blocking() && !result.passed;
            results.push(result);
            if blocked {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::InMemoryAuditStore;
    use crate::services::overlay_broker::OverlayBroker;

    fn patch() -> PatchSet {
        PatchSet {
            phase_run_id: "p1".into(),
            edits: vec![],
            precondition_sha: "sha".into(),
        }
    }

    fn test_profile() -> PolicyProfile {
        let mut profile = PolicyProfile::permissive_default("default");
        profile.command_allow_patterns = vec!["^(true|false)$".to_string()];
        profile
    }

    fn guard() -> Arc<PolicyGuard> {
        Arc::new(PolicyGuard::new(Arc::new(InMemoryAuditStore::new())))
    }

    #[tokio::test]
    async fn passing_command_predicate_reports_pass() {
        let runner = Arc::new(SandboxRunner::new(Arc::new(OverlayBroker::new())));
        let predicate = CommandPredicate::new("build_succeeds", vec!["true".into()], false, runner, guard(), test_profile());
        let result = predicate.evaluate(std::env::temp_dir().as_path(), &patch()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn failing_blocking_predicate_short_circuits() {
        let runner = Arc::new(SandboxRunner::new(Arc::new(OverlayBroker::new())));
        let mut registry = PredicateRegistry::new();
        registry.register(Arc::new(CommandPredicate::new(
            "build_succeeds",
            vec!["false".into()],
            true,
            runner.clone(),
            guard(),
            test_profile(),
        )));
        registry.register(Arc::new(CommandPredicate::new("lint_clean", vec!["true".into()], false, runner, guard(), test_profile())));
        let results = registry
            .evaluate_all(&["build_succeeds".into(), "lint_clean".into()], std::env::temp_dir().as_path(), &patch())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
    }
}
