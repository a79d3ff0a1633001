//! Reconciliation engine: decides whether an instance is new, healthy,
//! disabled or redeployed, and keeps the tool's registry record in step.
//!
//! Per-instance states are not stored as such; they follow from the tracked
//! entry plus the live filesystem:
//!
//! ```text
//!   Untracked --init/deploy--> TrackedEnabled --status--> TrackedEnabled (diff)
//!   TrackedDisabled --status, link moved--> Drifted --re-track--> TrackedEnabled
//! ```
//!
//! The tool's own registry record is read once per run, mutated in memory,
//! and pushed back whole. No action pushes more than once.

pub mod state;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::config::Config;
use crate::core::errors::{DtsError, Result};
use crate::core::identity::Instance;
use crate::core::paths::{clean_path, display_string};
use crate::logger::activity::ActivityLog;
use crate::registry::client::Registry;
use crate::registry::model::{AppRecord, TrackedEntry};
use crate::registry::tree::{AppKey, RegistryTree};
use crate::scanner::version::{decompose, resolve_working_tree};
use crate::scanner::walker::{FileClassification, FileClassifier, WalkerConfig};
use crate::snapshot::{DiffReport, SnapshotStore};

pub use state::{Action, DriftRecord, RunArgs, RunState};

/// Result of a successful `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Healthy instance: changed lines since the last snapshot.
    Report {
        /// Metric label: the tracked application name.
        label: String,
        /// Changed lines per file since the last snapshot.
        diff: DiffReport,
    },
    /// The instance had been redeployed and is now tracked under its new
    /// working tree. No diff is produced on this run.
    Redeployed {
        /// The re-tracked instance.
        instance: Instance,
        /// Working tree the instance is now tracked under.
        work_tree: PathBuf,
    },
}

/// Runs one action against a registry and a snapshot store, recording
/// everything it touches in a [`RunState`].
pub struct Engine<'a, R: Registry, S: SnapshotStore> {
    registry: &'a R,
    snapshots: &'a S,
    config: &'a Config,
    log: &'a mut ActivityLog,
    state: RunState,
    tool_key: AppKey,
    tool: AppRecord,
}

impl<'a, R: Registry, S: SnapshotStore> Engine<'a, R, S> {
    /// The tool's own record key is derived from `config.tool.appl_id` and
    /// the environment's tool instance.
    pub fn new(
        registry: &'a R,
        snapshots: &'a S,
        config: &'a Config,
        log: &'a mut ActivityLog,
        state: RunState,
    ) -> Self {
        let tool_key = AppKey {
            appl_id: config.tool.appl_id.to_string(),
            instance: state.env.tool_instance,
        };
        Self {
            registry,
            snapshots,
            config,
            log,
            state,
            tool_key,
            tool: AppRecord::default(),
        }
    }

    /// Finish the run, handing back the audit state.
    pub fn into_state(self) -> RunState {
        self.state
    }

    /// Start tracking the application at `work_tree_arg`.
    pub fn init(&mut self, work_tree_arg: &Path) -> Result<()> {
        let parts = decompose(work_tree_arg)?;
        self.state.env.work_tree = Some(parts.work_tree.clone());
        self.state.env.app_dir = Some(parts.app_dir.clone());
        self.state.env.instance = Some(parts.instance);
        self.log.info(format!(
            "init {} (work tree {}, instance {})",
            parts.app_dir.display(),
            parts.work_tree.display(),
            parts.instance
        ));

        let tree = self.fetch(false)?;
        let target = self.target(&tree, parts.instance)?;

        if self.tool.is_tracking(parts.instance) {
            return Err(DtsError::InstanceAlreadyTracked {
                instance: parts.instance.to_string(),
            });
        }
        let declared = clean_path(Path::new(&target.app_dir));
        if declared != parts.app_dir {
            return Err(DtsError::AppDirMismatch {
                resolved: display_string(&parts.app_dir),
                declared: target.app_dir.clone(),
            });
        }

        self.track(&target, parts.instance, &parts.work_tree, &parts.app_dir)?;
        self.push_tool()
    }

    /// Check one tracked instance; self-heals a redeployed one.
    pub fn status(&mut self, instance: Instance) -> Result<StatusOutcome> {
        self.state.env.instance = Some(instance);
        let tree = self.fetch(true)?;
        let target = self.target(&tree, instance)?;

        let entry = self
            .tool
            .tracked(instance)
            .cloned()
            .ok_or_else(|| DtsError::InstanceNotTracked {
                instance: instance.to_string(),
            })?;
        self.state.env.work_tree = Some(entry.work_tree.clone());
        self.state.env.app_dir = Some(entry.app_dir.clone());

        if !entry.enabled {
            return self.heal_disabled(instance, &entry, &target);
        }

        if target.application_name != entry.app_name {
            return Err(DtsError::AppNameMismatch {
                registry: target.application_name,
                tracked: entry.app_name,
            });
        }

        let diff = self.snapshots.numstat(&entry.work_tree, &entry.git_dir)?;
        self.log.info(format!(
            "status {instance}: {} changed files, {} binary",
            diff.changes.len(),
            diff.binaries.len()
        ));
        self.state.diff = Some(diff.clone());
        Ok(StatusOutcome::Report {
            label: entry.app_name,
            diff,
        })
    }

    /// Track every application on the host that is not yet tracked.
    ///
    /// Applications whose id is in `excluded`, or equals the tool's own id,
    /// are skipped, as are entries whose declared directory does not hash to
    /// their registry instance. The tool record is pushed once at the end.
    pub fn deploy(&mut self, excluded: &[String]) -> Result<Vec<Instance>> {
        let tree = self.fetch(false)?;
        let mut skip: Vec<String> = excluded.to_vec();
        skip.push(self.tool_key.appl_id.clone());

        let candidates = tree.candidates(&skip);
        self.log.info(format!("deploy: {} candidate applications", candidates.len()));

        for key in candidates {
            if self.tool.is_tracking(key.instance) {
                self.log
                    .info(format!("instance {} is already tracked, skipping", key.instance));
                continue;
            }
            let Some((_, target)) = tree.find_app_with_id(&key.appl_id, key.instance)? else {
                continue;
            };
            let app_dir = clean_path(Path::new(&target.app_dir));
            let derived = Instance::for_path(&app_dir);
            if target.app_dir.is_empty() || derived != key.instance {
                self.log.warn(format!(
                    "instance mismatch for {}: app_dir {:?} hashes to {derived}, skipping",
                    key.segment(),
                    target.app_dir
                ));
                continue;
            }

            let work_tree = resolve_working_tree(&app_dir)?;
            self.track(&target, key.instance, &work_tree, &app_dir)?;
            self.state.deployed.push(key.instance);
        }

        if self.state.deployed.is_empty() {
            self.log.info("deploy: nothing new to track");
        } else {
            self.push_tool()?;
        }
        Ok(self.state.deployed.clone())
    }

    fn heal_disabled(
        &mut self,
        instance: Instance,
        entry: &TrackedEntry,
        target: &AppRecord,
    ) -> Result<StatusOutcome> {
        let disabled = || DtsError::InstanceDisabled {
            instance: instance.to_string(),
        };
        if !entry.is_version_managed() {
            return Err(disabled());
        }
        let live = resolve_working_tree(&entry.app_dir)?;
        if clean_path(&live) == clean_path(&entry.work_tree) {
            return Err(disabled());
        }

        self.log.info(format!(
            "instance {instance}: new version deployed ({} -> {}), re-tracking",
            entry.work_tree.display(),
            live.display()
        ));
        self.tool.settings_mut().untrack(instance);
        self.tool.jobs_mut().remove_job(instance);
        let old_snapshot = if entry.git_dir.as_os_str().is_empty() {
            self.state.env.snapshot_dir(instance)
        } else {
            entry.git_dir.clone()
        };
        remove_snapshot_dir(&old_snapshot)?;
        self.log
            .info(format!("instance {instance}: removed {}", old_snapshot.display()));

        self.state.drift = Some(DriftRecord {
            instance,
            previous_work_tree: entry.work_tree.clone(),
            work_tree: live.clone(),
        });
        self.state.env.work_tree = Some(live.clone());
        self.track(target, instance, &live, &entry.app_dir)?;
        self.push_tool()?;
        Ok(StatusOutcome::Redeployed {
            instance,
            work_tree: live,
        })
    }

    /// Fetch the registry tree and load the tool's own record.
    fn fetch(&mut self, require_tool: bool) -> Result<RegistryTree> {
        let tree = self.registry.fetch()?;
        match tree.find_app_with_id(&self.tool_key.appl_id, self.tool_key.instance)? {
            Some((_, record)) => self.tool = record,
            None if require_tool => {
                return Err(DtsError::ToolAppNotFound {
                    instance: self.tool_key.instance.to_string(),
                });
            }
            None => {
                self.log.info(format!(
                    "no registry record for {} yet, starting empty",
                    self.tool_key.segment()
                ));
                self.tool = AppRecord::default();
            }
        }
        self.state.tool_app = Some(self.tool.clone());
        Ok(tree)
    }

    fn target(&mut self, tree: &RegistryTree, instance: Instance) -> Result<AppRecord> {
        let (_, target) = tree
            .find_app(instance)?
            .ok_or_else(|| DtsError::TargetAppNotFound {
                instance: instance.to_string(),
            })?;
        self.state.target_app = Some(target.clone());
        Ok(target)
    }

    /// Add `instance` to the tool record and take its first snapshot.
    fn track(
        &mut self,
        target: &AppRecord,
        instance: Instance,
        work_tree: &Path,
        app_dir: &Path,
    ) -> Result<FileClassification> {
        let snapshot_dir = self.state.env.snapshot_dir(instance);
        let config = self.config;

        self.tool.settings_mut().track(
            instance,
            TrackedEntry::new(&target.application_name, work_tree, app_dir, &snapshot_dir),
        );
        let command = format!(
            "{} -a status -i {instance}",
            self.state.env.tool_dir.join(self.binary_name()).display()
        );
        let jobs = self.tool.jobs_mut();
        jobs.set_owner(config.tool.appl_id, &config.tool.application_name, &config.job);
        jobs.upsert_job(instance, command, &config.job);
        self.tool.appl_id = config.tool.appl_id.to_string();
        self.tool.application_name.clone_from(&config.tool.application_name);
        self.tool.stand.clone_from(&target.stand);

        self.snapshots.init(work_tree, &snapshot_dir)?;
        let files = FileClassifier::new(WalkerConfig::from(&config.snapshot)).classify(work_tree)?;
        self.log.info(format!(
            "instance {instance}: {} trackable, {} unreadable, {} oversized, {} symlinks",
            files.trackable.len(),
            files.unreadable.len(),
            files.oversized.len(),
            files.symlinks.len()
        ));
        let committed = self
            .snapshots
            .commit(work_tree, &snapshot_dir, &files.trackable)?;
        self.log.info(format!(
            "instance {instance}: committed {committed} files to {}",
            snapshot_dir.display()
        ));

        self.state.files.insert(instance, files.clone());
        Ok(files)
    }

    fn push_tool(&mut self) -> Result<()> {
        let keys = self.registry.push(&self.tool_key, &self.tool)?;
        self.log.info(format!("updated {} registry keys", keys.len()));
        self.state.tool_app = Some(self.tool.clone());
        self.state.pushed_keys.extend(keys);
        Ok(())
    }

    fn binary_name(&self) -> String {
        self.config
            .tool
            .binary_name
            .clone()
            .unwrap_or_else(|| self.config.tool.application_name.to_lowercase())
    }
}

fn remove_snapshot_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DtsError::io(dir, source)),
    }
}
