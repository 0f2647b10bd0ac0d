//! Applies an adapter-produced `PatchSet` to a materialized workspace.
//!
//! Edits are opaque unified-diff bytes; this module never parses them, it
//! hands each one to `git apply` through `SandboxRunner` so the same
//! `check_command` gate used for every other spawned process also covers
//! patch application.

use crate::domain::models::{PatchSet, PolicyProfile, SandboxTier};
use crate::services::policy_guard::{PolicyError, PolicyGuard};
use crate::services::sandbox_runner::{ResourceCaps, SandboxError, SandboxRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchApplyError {
    #[error("patch precondition_sha {expected} does not match bound commit {actual}")]
    Conflict { expected: String, actual: String },
    #[error("policy denied patch write: {0}")]
    PolicyDenied(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("git apply failed for {path}: {message}")]
    ApplyFailed { path: String, message: String },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

const GIT_APPLY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PatchApplier {
    policy: Arc<PolicyGuard>,
    runner: Arc<SandboxRunner>,
}

impl PatchApplier {
    pub fn new(policy: Arc<PolicyGuard>, runner: Arc<SandboxRunner>) -> Self {
        Self { policy, runner }
    }

    /// A patch with no edits is a no-op: adapters whose execution model
    /// writes directly into the workspace (rather than returning a diff)
    /// report their result this way.
    pub async fn apply(
        &self,
        task_id: &str,
        profile: &PolicyProfile,
        workspace_root: &Path,
        bound_commit_sha: &str,
        patch: &PatchSet,
    ) -> Result<(), PatchApplyError> {
        if patch.edits.is_empty() {
            return Ok(());
        }
        if patch.precondition_sha != bound_commit_sha {
            return Err(PatchApplyError::Conflict {
                expected: patch.precondition_sha.clone(),
                actual: bound_commit_sha.to_string(),
            });
        }

        let resolved: Vec<_> = patch.touched_paths().into_iter().map(|p| workspace_root.join(p)).collect();
        let decision = self.policy.check_write(task_id, profile, &resolved).await?;
        if !decision.is_allowed() {
            return Err(PatchApplyError::PolicyDenied(format!("{decision:?}")));
        }

        let caps = ResourceCaps::for_tier(SandboxTier::Low);
        for edit in &patch.edits {
            let argv = vec!["git".to_string(), "apply".to_string(), "--whitespace=nowarn".to_string(), "-".to_string()];
            let handle = self
                .runner
                .run(task_id, workspace_root, &argv, &[], Some(edit.diff.clone()), caps, &self.policy, profile)
                .await?;
            let outcome = handle.wait(GIT_APPLY_TIMEOUT).await;
            if outcome.exit_code != Some(0) {
                return Err(PatchApplyError::ApplyFailed {
                    path: edit.path.clone(),
                    message: format!("exit_code={:?} exit_reason={:?}", outcome.exit_code, outcome.exit_reason),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ChangeType, FileEdit};
    use crate::infrastructure::database::InMemoryAuditStore;
    use crate::services::overlay_broker::OverlayBroker;

    fn profile_scoped_to(dir: &Path) -> PolicyProfile {
        let mut profile = PolicyProfile::permissive_default("default");
        profile.write_scope = vec![dir.to_string_lossy().to_string()];
        profile
    }

    fn applier() -> PatchApplier {
        let audit = Arc::new(InMemoryAuditStore::new());
        let policy = Arc::new(PolicyGuard::new(audit));
        let runner = Arc::new(SandboxRunner::new(Arc::new(OverlayBroker::new())));
        PatchApplier::new(policy, runner)
    }

    fn creation_patch(sha: &str) -> PatchSet {
        PatchSet {
            phase_run_id: "t1".into(),
            edits: vec![FileEdit {
                path: "new_file.txt".into(),
                change_type: ChangeType::Created,
                diff: b"--- /dev/null\n+++ b/new_file.txt\n@@ -0,0 +1 @@\n+hello\n".to_vec(),
            }],
            precondition_sha: sha.into(),
        }
    }

    #[tokio::test]
    async fn applies_a_valid_creation_diff() {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git").args(["init", "--quiet"]).current_dir(dir.path()).status().unwrap();

        applier()
            .apply("t1", &profile_scoped_to(dir.path()), dir.path(), "sha1", &creation_patch("sha1"))
            .await
            .unwrap();
        assert!(dir.path().join("new_file.txt").exists());
    }

    #[tokio::test]
    async fn empty_patch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let patch = PatchSet { phase_run_id: "t1".into(), edits: vec![], precondition_sha: "anything".into() };
        applier().apply("t1", &profile_scoped_to(dir.path()), dir.path(), "sha1", &patch).await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_precondition_sha_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let err = applier()
            .apply("t1", &profile_scoped_to(dir.path()), dir.path(), "current-sha", &creation_patch("stale-sha"))
            .await
            .unwrap_err();
        assert!(matches!(err, PatchApplyError::Conflict { .. }));
    }

    #[tokio::test]
    async fn writes_outside_scope_are_denied_before_applying() {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git").args(["init", "--quiet"]).current_dir(dir.path()).status().unwrap();
        let mut profile = PolicyProfile::permissive_default("default");
        profile.write_scope = vec!["/nonexistent-write-scope".to_string()];

        let err = applier().apply("t1", &profile, dir.path(), "sha1", &creation_patch("sha1")).await.unwrap_err();
        assert!(matches!(err, PatchApplyError::PolicyDenied(_)));
        assert!(!dir.path().join("new_file.txt").exists());
    }
}
