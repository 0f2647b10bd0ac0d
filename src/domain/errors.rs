//! Domain-level error types.
//!
//! Component boundaries (`PolicyGuard`, `SandboxRunner`, `AgentAdapter`,
//! `AuditStore`, `Scheduler`) each get their own narrow `thiserror` enum;
//! `DomainError` covers violations of entity invariants that can surface
//! from any of them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("policy profile {0} not found")]
    PolicyProfileNotFound(String),

    #[error("adapter {0} not found")]
    AdapterNotFound(String),

    #[error("acceptance predicate {0} not registered")]
    PredicateNotFound(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("concurrency conflict on {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: String },
}

pub type DomainResult<T> = Result<T, DomainError>;
