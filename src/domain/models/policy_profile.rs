//! `PolicyProfile` — named capability set bound to a task at submission.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyProfile {
    pub name: String,
    pub version: u64,
    /// Ordered; the first matching anchored pattern permits.
    pub command_allow_patterns: Vec<String>,
    /// Prefix set; every write path must lie under one of these.
    pub write_scope: Vec<String>,
    /// Host allow-patterns: exact match or suffix glob (e.g. `*.example.com`).
    pub egress_allow_list: Vec<String>,
    pub per_call_cost_ceiling: f64,
    pub per_task_cost_ceiling: f64,
    pub sandbox_tier: SandboxTier,
    /// Multiplier applied to an adapter's projected cost before the budget check.
    pub safety_multiplier: f64,
}

impl PolicyProfile {
    pub fn permissive_default(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            command_allow_patterns: vec![
                "^git (status|diff|log|add|commit|checkout|apply)( .*)?$".to_string(),
                "^cargo (test|build|check|clippy)( .*)?$".to_string(),
            ],
            write_scope: vec!["/workspace".to_string()],
            egress_allow_list: vec![],
            per_call_cost_ceiling: 1.0,
            per_task_cost_ceiling: 5.0,
            sandbox_tier: SandboxTier::Medium,
            safety_multiplier: 1.2,
        }
    }
}
