//! In-memory `AuditStore` for tests and local development.

use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditEntry, AuditEventKind};
use crate::domain::ports::AuditStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<HashMap<String, Vec<AuditEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, mut entry: AuditEntry) -> DomainResult<()> {
        let mut entries = self.entries.write().await;
        let task_entries = entries.entry(entry.task_id.clone()).or_default();
        entry.seq = task_entries.len() as i64;
        task_entries.push(entry);
        Ok(())
    }

    async fn scan(&self, task_id: &str, from_seq: Option<i64>) -> DomainResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        let from = from_seq.unwrap_or(0);
        Ok(entries.get(task_id).map(|v| v.iter().filter(|e| e.seq >= from).cloned().collect()).unwrap_or_default())
    }

    async fn latest_state(&self, task_id: &str) -> DomainResult<Option<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(task_id)
            .and_then(|v| v.iter().rev().find(|e| e.kind == AuditEventKind::StateTransition).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appended_entries_get_monotonic_sequence() {
        let store = InMemoryAuditStore::new();
        for _ in 0..5 {
            store.append(AuditEntry::transition("t1", "pending", "planning", None)).await.unwrap();
        }
        let entries = store.scan("t1", None).await.unwrap();
        let seqs: Vec<i64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn latest_state_returns_most_recent_transition() {
        let store = InMemoryAuditStore::new();
        store.append(AuditEntry::transition("t1", "pending", "planning", None)).await.unwrap();
        store.append(AuditEntry::metric("t1", AuditEventKind::PolicyDecision, serde_json::json!({}))).await.unwrap();
        store.append(AuditEntry::transition("t1", "planning", "coding", None)).await.unwrap();
        let latest = store.latest_state("t1").await.unwrap().unwrap();
        assert_eq!(latest.next_state.as_deref(), Some("coding"));
    }
}
