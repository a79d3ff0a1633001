//! Snapshot store backed by the `git` binary.
//!
//! Each instance gets a separate git directory under the snapshot root; the
//! application's working tree is passed with `--work-tree` so nothing is ever
//! written inside the application itself.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::config::SnapshotConfig;
use crate::core::errors::{DtsError, Result};
use crate::snapshot::{DiffReport, SnapshotStore};

/// Files per `git add` invocation.
const ADD_BATCH: usize = 256;

#[derive(Debug, Clone)]
pub struct GitSnapshotStore {
    git: PathBuf,
    author_name: String,
    author_email: String,
}

impl GitSnapshotStore {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            git: config.git_binary.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    fn base_args(&self, work_tree: &Path, snapshot_dir: &Path) -> Vec<OsString> {
        let mut git_dir = OsString::from("--git-dir=");
        git_dir.push(snapshot_dir);
        let mut tree = OsString::from("--work-tree=");
        tree.push(work_tree);
        vec![
            "-c".into(),
            format!("user.name={}", self.author_name).into(),
            "-c".into(),
            format!("user.email={}", self.author_email).into(),
            "-c".into(),
            "commit.gpgsign=false".into(),
            "-c".into(),
            "core.quotepath=false".into(),
            git_dir,
            tree,
        ]
    }

    fn run(
        &self,
        operation: &'static str,
        work_tree: &Path,
        snapshot_dir: &Path,
        args: &[OsString],
    ) -> Result<String> {
        let output = Command::new(&self.git)
            .args(self.base_args(work_tree, snapshot_dir))
            .args(args)
            .output()
            .map_err(|err| DtsError::Snapshot {
                operation,
                details: format!("failed to run {}: {err}", self.git.display()),
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(DtsError::Snapshot {
                operation,
                details: format!(
                    "git exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

impl SnapshotStore for GitSnapshotStore {
    fn init(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<()> {
        fs::create_dir_all(snapshot_dir).map_err(|source| DtsError::io(snapshot_dir, source))?;
        self.run("init", work_tree, snapshot_dir, &["init".into(), "--quiet".into()])
            .map(drop)
    }

    fn commit(&self, work_tree: &Path, snapshot_dir: &Path, files: &[PathBuf]) -> Result<usize> {
        for batch in files.chunks(ADD_BATCH) {
            let mut args: Vec<OsString> = vec!["add".into(), "--force".into(), "--".into()];
            args.extend(batch.iter().map(|file| file.as_os_str().to_owned()));
            self.run("add", work_tree, snapshot_dir, &args)?;
        }
        let message = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.run(
            "commit",
            work_tree,
            snapshot_dir,
            &[
                "commit".into(),
                "--quiet".into(),
                "--allow-empty".into(),
                "--no-verify".into(),
                "-m".into(),
                message.into(),
            ],
        )?;
        Ok(files.len())
    }

    fn numstat(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<DiffReport> {
        let out = self.run(
            "numstat",
            work_tree,
            snapshot_dir,
            &[
                "diff".into(),
                "--numstat".into(),
                "-z".into(),
                "--no-renames".into(),
                "HEAD".into(),
                "--".into(),
            ],
        )?;
        parse_numstat(&out)
    }
}

/// Parse `git diff --numstat -z` output: NUL-terminated
/// `added<TAB>deleted<TAB>path` records, with `-<TAB>-` marking binary files.
/// Paths are raw, never C-quoted.
pub fn parse_numstat(output: &str) -> Result<DiffReport> {
    let mut report = DiffReport::default();
    for line in output.split('\0').filter(|line| !line.is_empty()) {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DtsError::Snapshot {
                operation: "numstat",
                details: format!("unexpected line: {line:?}"),
            });
        };
        if added == "-" && deleted == "-" {
            report.binaries.push(path.to_string());
            continue;
        }
        let count = |field: &str| {
            field.parse::<u64>().map_err(|_| DtsError::Snapshot {
                operation: "numstat",
                details: format!("bad count {field:?} in {line:?}"),
            })
        };
        report
            .changes
            .insert(path.to_string(), count(added)? + count(deleted)?);
    }
    report.binaries.sort();
    Ok(report)
}
