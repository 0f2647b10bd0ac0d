//! Adapter registry: a typed, explicit registry of concrete `AgentAdapter`
//! implementations keyed by id, replacing the dynamic reflection-based
//! registries of the source system with a capability bitset checked at
//! registration time.

pub mod cli_pty;
pub mod http_api;
pub mod mock;

use crate::domain::models::{AdapterDescriptor, Capability};
use crate::domain::ports::AgentAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("adapter {0} is not registered")]
    NotFound(String),
    #[error("no adapter declares capability {0:?}")]
    NoCapableAdapter(Capability),
}

struct Registration {
    descriptor: AdapterDescriptor,
    adapter: Arc<dyn AgentAdapter>,
}

/// Descriptors are immutable once loaded; the registry is consulted
/// read-only by the `TaskStateMachine`.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: HashMap<String, Registration>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: AdapterDescriptor, adapter: Arc<dyn AgentAdapter>) {
        self.entries.insert(descriptor.id.clone(), Registration { descriptor, adapter });
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn AgentAdapter>, RegistryError> {
        self.entries
            .get(id)
            .map(|r| r.adapter.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn descriptor(&self, id: &str) -> Result<&AdapterDescriptor, RegistryError> {
        self.entries
            .get(id)
            .map(|r| &r.descriptor)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Static routing by capability: the first registered adapter declaring
    /// `capability` wins. A dynamic cost-vs-remaining-budget rule can be
    /// layered on top by callers that compare `estimate_cost` results
    /// across `by_capability`'s candidates.
    pub fn by_capability(&self, capability: Capability) -> Result<&AdapterDescriptor, RegistryError> {
        self.entries
            .values()
            .map(|r| &r.descriptor)
            .find(|d| d.has_capability(capability))
            .ok_or(RegistryError::NoCapableAdapter(capability))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AdapterDescriptor> {
        self.entries.values().map(|r| &r.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CostModel, ExecutionModel};
    use std::collections::BTreeSet;

    #[test]
    fn registry_routes_by_capability() {
        let mut registry = AdapterRegistry::new();
        let descriptor = AdapterDescriptor {
            id: "mock".into(),
            capabilities: BTreeSet::from([Capability::Plan, Capability::Propose]),
            execution_model: ExecutionModel::InProcess,
            default_policy_profile: "default".into(),
            cost_model: CostModel { rate_per_input_token: 0.0, rate_per_output_token: 0.0 },
        };
        registry.register(descriptor, Arc::new(mock::MockAdapter::new("mock")));
        assert!(registry.by_capability(Capability::Plan).is_ok());
        assert!(matches!(registry.by_capability(Capability::Embed), Err(RegistryError::NoCapableAdapter(_))));
    }
}
