//! Port for the append-only audit log.

use crate::domain::errors::DomainResult;
use crate::domain::models::AuditEntry;
use async_trait::async_trait;

/// Durable append-only log of every state transition, policy decision,
/// budget event, and terminal outcome.
///
/// Guarantees required of every implementation:
/// 1. for each task, appended entries form a total order consistent with
///    wall-clock causality;
/// 2. an entry is never visible to `scan` before it is durable;
/// 3. the store tolerates a crash between two appends without corruption.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Atomically appends `entry`. On failure the caller must treat the
    /// originating action as not-yet-durable and retry or fail the task
    /// ("no transition without audit").
    async fn append(&self, entry: AuditEntry) -> DomainResult<()>;

    /// Entries for a task in append order, optionally starting at `from_seq`.
    async fn scan(&self, task_id: &str, from_seq: Option<i64>) -> DomainResult<Vec<AuditEntry>>;

    /// The most recent transition for a task, used by the Scheduler on
    /// restart to resume or mark the task FAILED.
    async fn latest_state(&self, task_id: &str) -> DomainResult<Option<AuditEntry>>;
}
