//! Append-only log file with open-time rotation and stderr fallback.
//!
//! A file larger than the threshold at open time is renamed to
//! `<stem>_<YYYYmmdd_HHMM>.<ext>` and a fresh file is started. Logging never
//! fails the run: if the file cannot be opened or written, lines go to stderr
//! with a `[DTS-LOG]` prefix.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::errors::{DtsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    File,
    Stderr,
}

/// Log file handle. Closed on drop.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: Option<File>,
    state: SinkState,
    rotated: Option<PathBuf>,
}

impl RotatingFile {
    /// Rotate `path` if it exceeds `max_size_bytes`, then open it for append.
    pub fn open(path: &Path, max_size_bytes: u64) -> Self {
        let rotated = match rotate_if_needed(path, max_size_bytes, Local::now()) {
            Ok(rotated) => rotated,
            Err(err) => {
                let _ = writeln!(io::stderr(), "[DTS-LOG] rotation failed: {err}");
                None
            }
        };

        match open_append(path) {
            Ok(file) => Self {
                path: path.to_path_buf(),
                file: Some(file),
                state: SinkState::File,
                rotated,
            },
            Err(err) => {
                let _ = writeln!(io::stderr(), "[DTS-LOG] {err}; logging to stderr");
                Self {
                    path: path.to_path_buf(),
                    file: None,
                    state: SinkState::Stderr,
                    rotated,
                }
            }
        }
    }

    /// Write one line (a trailing newline is added).
    pub fn write_line(&mut self, line: &str) {
        let record = format!("{line}\n");
        if self.state == SinkState::File
            && let Some(file) = self.file.as_mut()
        {
            if file.write_all(record.as_bytes()).is_ok() {
                return;
            }
            self.file = None;
            self.state = SinkState::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[DTS-LOG] write to {} failed; logging to stderr",
                self.path.display()
            );
        }
        let _ = write!(io::stderr(), "[DTS-LOG] {record}");
    }

    /// Whether output currently goes to the file.
    pub fn is_file_backed(&self) -> bool {
        self.state == SinkState::File
    }

    /// Where the previous file was moved at open time, if it was rotated.
    pub fn rotated_to(&self) -> Option<&Path> {
        self.rotated.as_deref()
    }
}

/// Name of the rotated copy of `base` at `now`.
pub fn rotated_name(base: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = base
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let stamp = now.format("%Y%m%d_%H%M");
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    base.with_file_name(name)
}

/// Rename `path` aside when it is larger than `max_size_bytes`.
pub fn rotate_if_needed(
    path: &Path,
    max_size_bytes: u64,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DtsError::io(path, source)),
    };
    if size <= max_size_bytes {
        return Ok(None);
    }

    let mut target = rotated_name(path, now);
    let mut n = 1;
    while target.exists() {
        let candidate = rotated_name(path, now);
        let stem = candidate
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        let name = match candidate.extension() {
            Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{n}"),
        };
        target = candidate.with_file_name(name);
        n += 1;
    }
    fs::rename(path, &target).map_err(|source| DtsError::io(path, source))?;
    Ok(Some(target))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| DtsError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DtsError::io(path, source))
}
