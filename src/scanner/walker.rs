//! Directory classifier: buckets every file under a working tree into
//! trackable, unreadable, oversized or symlink.
//!
//! The walk never follows symbolic links and never descends into `.git`
//! directories (a snapshot repository cannot track paths inside one). Any
//! traversal failure aborts the walk and discards partial results.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::SnapshotConfig;
use crate::core::errors::{DtsError, Result};

/// Files above this size are not tracked.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

const GIT_DIR_NAME: &str = ".git";

/// Classifier configuration derived from `SnapshotConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkerConfig {
    pub max_file_size: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl From<&SnapshotConfig> for WalkerConfig {
    fn from(value: &SnapshotConfig) -> Self {
        Self {
            max_file_size: value.max_file_size_bytes,
        }
    }
}

/// Result of a directory walk. All paths are relative to the walked root and
/// every list is sorted lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileClassification {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub trackable: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unreadable: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub oversized: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub symlinks: Vec<(PathBuf, PathBuf)>,
}

impl FileClassification {
    /// Total number of classified entries.
    pub fn len(&self) -> usize {
        self.trackable.len() + self.unreadable.len() + self.oversized.len() + self.symlinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sort(&mut self) {
        self.trackable.sort();
        self.unreadable.sort();
        self.oversized.sort();
        self.symlinks.sort();
    }
}

/// Sequential recursive classifier.
#[derive(Debug, Clone, Default)]
pub struct FileClassifier {
    config: WalkerConfig,
}

impl FileClassifier {
    pub fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    /// Walk `root` and classify every non-directory entry.
    pub fn classify(&self, root: &Path) -> Result<FileClassification> {
        let mut out = FileClassification::default();
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| DtsError::io(&dir, source))?;
            for entry in entries {
                let entry = entry.map_err(|source| DtsError::io(&dir, source))?;
                let path = entry.path();
                // DirEntry::file_type does not follow symlinks.
                let file_type = entry
                    .file_type()
                    .map_err(|source| DtsError::io(&path, source))?;
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

                if file_type.is_symlink() {
                    let target =
                        fs::read_link(&path).map_err(|source| DtsError::io(&path, source))?;
                    out.symlinks.push((relative, target));
                } else if file_type.is_dir() {
                    if entry.file_name() != GIT_DIR_NAME {
                        pending.push(path);
                    }
                } else {
                    let meta =
                        fs::symlink_metadata(&path).map_err(|source| DtsError::io(&path, source))?;
                    if !meta.is_file() || !mode_allows_read(&meta) {
                        out.unreadable.push(relative);
                    } else if meta.len() > self.config.max_file_size {
                        out.oversized.push(relative);
                    } else {
                        out.trackable.push(relative);
                    }
                }
            }
        }

        out.sort();
        Ok(out)
    }
}

/// Classify with default limits.
pub fn classify(root: &Path) -> Result<FileClassification> {
    FileClassifier::default().classify(root)
}

/// Whether the file's permission bits grant read access to this process.
///
/// Only the mode triad is consulted (owner if we own it, group if our group
/// owns it, other otherwise); privileged overrides are ignored so a file
/// published without read bits is never snapshotted.
#[cfg(unix)]
fn mode_allows_read(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;

    let mode = meta.mode();
    let mask = if meta.uid() == nix::unistd::geteuid().as_raw() {
        0o400
    } else if meta.gid() == nix::unistd::getegid().as_raw() {
        0o040
    } else {
        0o004
    };
    mode & mask != 0
}

#[cfg(not(unix))]
fn mode_allows_read(_meta: &fs::Metadata) -> bool {
    true
}
