//! `PatchSet` — a proposed set of file changes produced by an adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub change_type: ChangeType,
    /// Opaque unified-diff bytes, never interpreted by the core.
    pub diff: Vec<u8>,
}

/// Invariants: `precondition_sha` matches repo head when applied; every
/// touched path passes `PolicyGuard::check_write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSet {
    pub phase_run_id: String,
    pub edits: Vec<FileEdit>,
    pub precondition_sha: String,
}

impl PatchSet {
    pub fn touched_paths(&self) -> BTreeSet<&str> {
        self.edits.iter().map(|e| e.path.as_str()).collect()
    }
}
