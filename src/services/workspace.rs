//! Ephemeral per-task workspace allocation.
//!
//! An overlay-mounted directory per task, seeded from the repo at the
//! bound commit; on termination the workspace is retained for a grace
//! window for post-mortem inspection, then removed.

use crate::domain::models::RepoRef;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to materialize workspace: {0}")]
    Materialize(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Workspace {
    pub task_id: String,
    pub root: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Allocates workspaces under a configurable ephemeral root and removes
/// them after their grace window expires.
pub struct WorkspaceAllocator {
    ephemeral_root: PathBuf,
    grace: chrono::Duration,
}

impl WorkspaceAllocator {
    pub fn new(ephemeral_root: PathBuf, grace: chrono::Duration) -> Self {
        Self { ephemeral_root, grace }
    }

    /// Clones `repo.url` at `repo.branch`/`repo.commit_sha` into a fresh
    /// directory under the ephemeral root. Real deployments back this with
    /// a filesystem overlay (copy-on-write upper layer over a cached
    /// baseline checkout); here we always do a fresh shallow clone, which
    /// satisfies the same "fresh overlay mount per task" contract.
    pub async fn materialize(&self, task_id: &str, repo: &RepoRef) -> Result<Workspace, WorkspaceError> {
        let root = self.ephemeral_root.join(task_id);
        tokio::fs::create_dir_all(&root).await?;

        let status = Command::new("git")
            .args(["clone", "--branch", &repo.branch, "--single-branch", &repo.url, "."])
            .current_dir(&root)
            .status()
            .await?;
        if !status.success() {
            return Err(WorkspaceError::Materialize(format!("git clone failed for {}", repo.url)));
        }
        let status = Command::new("git")
            .args(["checkout", &repo.commit_sha])
            .current_dir(&root)
            .status()
            .await?;
        if !status.success() {
            return Err(WorkspaceError::Materialize(format!(
                "git checkout {} failed",
                repo.commit_sha
            )));
        }
        Ok(Workspace {
            task_id: task_id.to_string(),
            root,
        })
    }

    /// Schedules removal after the grace window; callers typically spawn
    /// this as a detached task at terminal-state transition.
    pub async fn retire(&self, workspace: Workspace) {
        let grace = self.grace;
        tokio::spawn(async move {
            if let Ok(std_dur) = grace.to_std() {
                tokio::time::sleep(std_dur).await;
            }
            let _ = tokio::fs::remove_dir_all(&workspace.root).await;
        });
    }
}
