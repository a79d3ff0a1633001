//! Snapshot store: per-instance history of a working tree.
//!
//! The engine only needs three things from it: create an empty history,
//! record a set of files, and count changed lines since the last record.

pub mod git;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

pub use git::GitSnapshotStore;

/// Changed-line counts since the last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Relative path to added plus deleted line count.
    pub changes: BTreeMap<String, u64>,
    /// Changed files that have no line count.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<String>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.binaries.is_empty()
    }
}

/// History operations, keyed by `(work_tree, snapshot_dir)`.
pub trait SnapshotStore {
    /// Create an empty history for `work_tree` in `snapshot_dir`.
    fn init(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<()>;

    /// Record `files` (relative to `work_tree`). Returns how many were recorded.
    fn commit(&self, work_tree: &Path, snapshot_dir: &Path, files: &[PathBuf]) -> Result<usize>;

    /// Per-file changed-line counts between `work_tree` and its last record.
    fn numstat(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<DiffReport>;
}
