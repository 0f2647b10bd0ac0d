//! Core domain entities. No I/O lives here.

pub mod adapter_descriptor;
pub mod audit_entry;
pub mod overlay_event;
pub mod patch_set;
pub mod phase;
pub mod policy_profile;
pub mod task;

pub use adapter_descriptor::{AdapterDescriptor, Capability, CostModel, ExecutionModel};
pub use audit_entry::{AuditEntry, AuditEventKind};
pub use overlay_event::{MetaRecord, OverlayEvent, Stream};
pub use patch_set::{ChangeType, FileEdit, PatchSet};
pub use phase::{ArtifactRef, OutcomeClassification, Phase, PhaseOutcome, PhaseOutcomeBody, PhaseRun, RunOutcome};
pub use policy_profile::{PolicyProfile, SandboxTier};
pub use task::{AcceptanceCriterion, Budgets, RepoRef, Spent, Task, TaskMode, TaskStatus};
