//! Human-readable activity log: `<RFC3339> [LEVEL] message`, one per line.
//!
//! Constructed once by the caller and lent to the engine. Lines go to the log
//! file and, when enabled, to stderr.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::logger::rotation::RotatingFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug)]
enum Target {
    File(RotatingFile),
    Memory,
}

#[derive(Debug)]
pub struct ActivityLog {
    target: Target,
    mirror_stderr: bool,
    lines: Vec<String>,
}

impl ActivityLog {
    pub fn open(path: &Path, max_size_bytes: u64, mirror_stderr: bool) -> Self {
        let file = RotatingFile::open(path, max_size_bytes);
        let rotated = file.rotated_to().map(Path::to_path_buf);
        let mut log = Self {
            target: Target::File(file),
            mirror_stderr,
            lines: Vec::new(),
        };
        if let Some(rotated) = rotated {
            log.info(format!("previous log rotated to {}", rotated.display()));
        }
        log
    }

    /// Log that only keeps lines in memory (see [`ActivityLog::lines`]).
    pub fn in_memory() -> Self {
        Self {
            target: Target::Memory,
            mirror_stderr: false,
            lines: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.log(Level::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.log(Level::Warning, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.log(Level::Error, message.as_ref());
    }

    pub fn log(&mut self, level: Level, message: &str) {
        let ts = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        let line = format!("{ts} [{}] {message}", level.label());
        if self.mirrors_to_stderr() {
            let _ = writeln!(io::stderr(), "{line}");
        }
        match &mut self.target {
            Target::File(file) => file.write_line(&line),
            Target::Memory => self.lines.push(line),
        }
    }

    /// A file sink that fell back to stderr already prints there.
    fn mirrors_to_stderr(&self) -> bool {
        match &self.target {
            Target::File(file) => self.mirror_stderr && file.is_file_backed(),
            Target::Memory => self.mirror_stderr,
        }
    }

    /// Lines captured by an in-memory log.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}
