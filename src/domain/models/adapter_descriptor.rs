//! `AdapterDescriptor` — registration record for an `AgentAdapter`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Plan,
    Propose,
    Refine,
    ApplyPatch,
    RunTests,
    SummarizeDiff,
    Embed,
    CommitMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    CliPty,
    HttpApi,
    InProcess,
}

/// Rate per input/output unit, used by `estimate_cost` and `PolicyGuard::check_budget`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostModel {
    pub rate_per_input_token: f64,
    pub rate_per_output_token: f64,
}

impl CostModel {
    pub fn estimate(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        tokens_in as f64 * self.rate_per_input_token + tokens_out as f64 * self.rate_per_output_token
    }
}

/// Immutable once loaded; a reload only affects tasks submitted after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    pub id: String,
    pub capabilities: BTreeSet<Capability>,
    pub execution_model: ExecutionModel,
    pub default_policy_profile: String,
    pub cost_model: CostModel,
}

impl AdapterDescriptor {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}
