//! SQLite-backed `AuditStore`: append-only, durable, crash-tolerant by
//! virtue of every append being its own committed transaction.

use crate::domain::errors::DomainResult;
use crate::domain::models::{AuditEntry, AuditEventKind};
use crate::domain::ports::AuditStore;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn kind_to_str(kind: &AuditEventKind) -> &'static str {
    match kind {
        AuditEventKind::Created => "created",
        AuditEventKind::StateTransition => "state_transition",
        AuditEventKind::PolicyDecision => "policy_decision",
        AuditEventKind::BudgetEvent => "budget_event",
        AuditEventKind::PhaseRunStarted => "phase_run_started",
        AuditEventKind::PhaseRunCompleted => "phase_run_completed",
        AuditEventKind::Cancelled => "cancelled",
        AuditEventKind::TerminalOutcome => "terminal_outcome",
    }
}

fn str_to_kind(s: &str) -> AuditEventKind {
    match s {
        "created" => AuditEventKind::Created,
        "state_transition" => AuditEventKind::StateTransition,
        "policy_decision" => AuditEventKind::PolicyDecision,
        "budget_event" => AuditEventKind::BudgetEvent,
        "phase_run_started" => AuditEventKind::PhaseRunStarted,
        "phase_run_completed" => AuditEventKind::PhaseRunCompleted,
        "cancelled" => AuditEventKind::Cancelled,
        _ => AuditEventKind::TerminalOutcome,
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: AuditEntry) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let next_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), -1) + 1 FROM audit_entries WHERE task_id = ?")
            .bind(&entry.task_id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO audit_entries (task_id, seq, kind, prior_state, next_state, payload, timestamp, causation_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.task_id)
        .bind(next_seq)
        .bind(kind_to_str(&entry.kind))
        .bind(&entry.prior_state)
        .bind(&entry.next_state)
        .bind(entry.payload.to_string())
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.causation_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn scan(&self, task_id: &str, from_seq: Option<i64>) -> DomainResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT task_id, seq, kind, prior_state, next_state, payload, timestamp, causation_id
             FROM audit_entries WHERE task_id = ? AND seq >= ? ORDER BY seq ASC",
        )
        .bind(task_id)
        .bind(from_seq.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                let timestamp: String = row.try_get("timestamp")?;
                Ok(AuditEntry {
                    task_id: row.try_get("task_id")?,
                    seq: row.try_get("seq")?,
                    kind: str_to_kind(&row.try_get::<String, _>("kind")?),
                    prior_state: row.try_get("prior_state")?,
                    next_state: row.try_get("next_state")?,
                    payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                    timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                        .map(|dt| dt.with_timezone(&chrono::Utc))
                        .unwrap_or_else(|_| chrono::Utc::now()),
                    causation_id: row.try_get("causation_id")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    async fn latest_state(&self, task_id: &str) -> DomainResult<Option<AuditEntry>> {
        let entries = self.scan(task_id, None).await?;
        Ok(entries.into_iter().filter(|e| e.kind == AuditEventKind::StateTransition).last())
    }
}
