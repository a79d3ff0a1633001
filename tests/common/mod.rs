#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use drift_tracker::core::config::Config;
use drift_tracker::core::env::Environment;
use drift_tracker::core::errors::Result;
use drift_tracker::core::identity::Instance;
use drift_tracker::engine::{Action, Engine, RunArgs, RunState};
use drift_tracker::logger::activity::ActivityLog;
use drift_tracker::registry::client::{MemoryRegistry, Registry};
use drift_tracker::registry::model::{AppRecord, TrackedEntry};
use drift_tracker::registry::tree::AppKey;
use drift_tracker::snapshot::{DiffReport, SnapshotStore};
use tempfile::TempDir;

pub const APPS: &str = "/ps/hosts/test/tst-app-host1d/apps";

// ──────────────────── CLI runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_dts") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "dts.exe" } else { "dts" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve dts binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("dts-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute dts command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_content = format!(
        "case={case_name}\nbin={}\nargs={args:?}\nstatus={}\n----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        bin_path.display(),
        output.status
    );
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── snapshot fake ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCall {
    Init { work_tree: PathBuf, snapshot_dir: PathBuf },
    Commit { work_tree: PathBuf, files: Vec<PathBuf> },
    Numstat { work_tree: PathBuf, snapshot_dir: PathBuf },
}

/// Snapshot store that records calls and answers `numstat` with a fixed report.
#[derive(Debug, Default)]
pub struct RecordingSnapshots {
    pub calls: RefCell<Vec<SnapshotCall>>,
    pub report: DiffReport,
}

impl RecordingSnapshots {
    pub fn with_report(report: DiffReport) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            report,
        }
    }

    pub fn calls(&self) -> Vec<SnapshotCall> {
        self.calls.borrow().clone()
    }
}

impl SnapshotStore for RecordingSnapshots {
    fn init(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<()> {
        fs::create_dir_all(snapshot_dir).expect("create snapshot dir");
        self.calls.borrow_mut().push(SnapshotCall::Init {
            work_tree: work_tree.to_path_buf(),
            snapshot_dir: snapshot_dir.to_path_buf(),
        });
        Ok(())
    }

    fn commit(&self, work_tree: &Path, _snapshot_dir: &Path, files: &[PathBuf]) -> Result<usize> {
        self.calls.borrow_mut().push(SnapshotCall::Commit {
            work_tree: work_tree.to_path_buf(),
            files: files.to_vec(),
        });
        Ok(files.len())
    }

    fn numstat(&self, work_tree: &Path, snapshot_dir: &Path) -> Result<DiffReport> {
        self.calls.borrow_mut().push(SnapshotCall::Numstat {
            work_tree: work_tree.to_path_buf(),
            snapshot_dir: snapshot_dir.to_path_buf(),
        });
        Ok(self.report.clone())
    }
}

// ──────────────────── fleet fixture ────────────────────

/// A tool directory, a snapshot root and a registry, all in one temp dir.
pub struct Fleet {
    pub tmp: TempDir,
    pub config: Config,
    pub registry: MemoryRegistry,
    pub log: ActivityLog,
}

impl Fleet {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("dts")).expect("tool dir");
        fs::create_dir_all(tmp.path().join("apps")).expect("apps dir");
        Self {
            tmp,
            config: Config::default(),
            registry: MemoryRegistry::new(APPS),
            log: ActivityLog::in_memory(),
        }
    }

    pub fn tool_dir(&self) -> PathBuf {
        self.tmp.path().join("dts")
    }

    pub fn snapshot_root(&self) -> PathBuf {
        self.tmp.path().join("dts").join("snapshots")
    }

    pub fn tool_key(&self) -> AppKey {
        AppKey {
            appl_id: self.config.tool.appl_id.to_string(),
            instance: Instance::for_path(&self.tool_dir()),
        }
    }

    pub fn env(&self) -> Environment {
        Environment::explicit(
            "tst-app-host1d",
            "http://127.0.0.1:2379",
            APPS,
            &self.tool_dir(),
            &self.snapshot_root(),
        )
    }

    /// Create a plain application directory with a couple of config files.
    pub fn plain_app(&self, name: &str) -> PathBuf {
        let dir = self.tmp.path().join("apps").join(name);
        fs::create_dir_all(dir.join("conf")).expect("app dir");
        fs::write(dir.join("conf").join("app.yml"), "port: 8080\n").expect("write conf");
        fs::write(dir.join("README"), "hello\n").expect("write readme");
        dir
    }

    /// Create a version-managed application with the given releases;
    /// `current` points at `active`.
    #[cfg(unix)]
    pub fn versioned_app(&self, name: &str, versions: &[&str], active: &str) -> PathBuf {
        let dir = self.tmp.path().join("apps").join(name);
        for version in versions {
            let release = dir.join("versions").join(version);
            fs::create_dir_all(&release).expect("release dir");
            fs::write(release.join("app.yml"), format!("version: {version}\n")).expect("write");
        }
        std::os::unix::fs::symlink(dir.join("versions").join(active), dir.join("current"))
            .expect("current link");
        dir
    }

    /// Register a target application record for `app_dir`.
    pub fn register_app(&self, appl_id: &str, app_dir: &Path, name: &str) -> AppKey {
        let key = AppKey {
            appl_id: appl_id.to_string(),
            instance: Instance::for_path(app_dir),
        };
        let record = AppRecord {
            app_dir: app_dir.display().to_string(),
            appl_id: appl_id.to_string(),
            application_name: name.to_string(),
            instance: key.instance.to_string(),
            stand: "prod".to_string(),
            ..AppRecord::default()
        };
        self.registry.seed(&key, &record).expect("seed app");
        key
    }

    /// Register the tool's own record with the given tracked entries.
    pub fn register_tool(&self, entries: &[(Instance, TrackedEntry)]) {
        let mut record = AppRecord {
            appl_id: self.config.tool.appl_id.to_string(),
            application_name: self.config.tool.application_name.clone(),
            ..AppRecord::default()
        };
        for (instance, entry) in entries {
            record.settings_mut().track(*instance, entry.clone());
            record.jobs_mut().upsert_job(
                *instance,
                format!("dts -a status -i {instance}"),
                &self.config.job,
            );
        }
        self.registry
            .seed(&self.tool_key(), &record)
            .expect("seed tool record");
    }

    /// Tool record as currently stored in the registry.
    pub fn tool_record(&self) -> AppRecord {
        self.registry
            .fetch()
            .expect("fetch")
            .find_app_with_id(&self.tool_key().appl_id, self.tool_key().instance)
            .expect("parse tool record")
            .map(|(_, record)| record)
            .unwrap_or_default()
    }

    pub fn engine<'a>(
        &'a mut self,
        snapshots: &'a RecordingSnapshots,
        action: Action,
    ) -> Engine<'a, MemoryRegistry, RecordingSnapshots> {
        let state = RunState::new(
            RunArgs {
                action,
                work_tree: None,
                instance: None,
                test: true,
            },
            self.env(),
        );
        Engine::new(&self.registry, snapshots, &self.config, &mut self.log, state)
    }
}
