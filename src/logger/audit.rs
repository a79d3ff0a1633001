//! Audit log: one compact JSON document per run.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::logger::rotation::RotatingFile;

#[derive(Debug)]
pub struct AuditLog {
    file: RotatingFile,
}

impl AuditLog {
    pub fn open(path: &Path, max_size_bytes: u64) -> Self {
        Self {
            file: RotatingFile::open(path, max_size_bytes),
        }
    }

    /// Append `record` as a single line.
    pub fn write_record<T: Serialize>(&mut self, record: &T) {
        match serde_json::to_string(record) {
            Ok(json) => self.file.write_line(&json),
            Err(err) => {
                let _ = writeln!(io::stderr(), "[DTS-LOG] audit serialize error: {err}");
            }
        }
    }
}
