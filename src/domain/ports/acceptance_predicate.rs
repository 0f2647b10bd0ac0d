//! Tool-plugin interface for acceptance predicates: cheap predicates run
//! first and a blocking failure short-circuits the rest.

use crate::domain::models::PatchSet;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PredicateResult {
    pub passed: bool,
    pub summary: String,
    pub artifacts: Vec<String>,
}

/// A named, pluggable acceptance check. Predicates are invoked through
/// `SandboxRunner` like any other external tool.
#[async_trait]
pub trait AcceptancePredicate: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this predicate is cheap enough to run before more expensive
    /// ones; a blocking failure on a cheap predicate skips the rest.
    fn is_blocking(&self) -> bool {
        false
    }

    async fn evaluate(&self, workspace: &Path, patch: &PatchSet) -> PredicateResult;
}
