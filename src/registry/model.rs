//! Typed views over one registry application record.
//!
//! `AppRecord` mirrors the flat string fields of a registry entry plus two
//! structured sub-documents: `dts_settings` (which instances this tool
//! tracks) and `emon_json` (the metric collection jobs the collector runs).

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::config::JobConfig;
use crate::core::identity::Instance;

/// One application entry of the registry tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_dir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub appl_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub application_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pid_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub product_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dts_settings: Option<TrackingSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emon_json: Option<MetricJobSpec>,
}

impl AppRecord {
    /// Tracking settings, created empty on first use.
    pub fn settings_mut(&mut self) -> &mut TrackingSettings {
        self.dts_settings.get_or_insert_with(TrackingSettings::default)
    }

    /// Metric job spec, created empty on first use.
    pub fn jobs_mut(&mut self) -> &mut MetricJobSpec {
        self.emon_json.get_or_insert_with(MetricJobSpec::default)
    }

    pub fn tracked(&self, instance: Instance) -> Option<&TrackedEntry> {
        self.dts_settings
            .as_ref()
            .and_then(|settings| settings.app_list.get(&instance))
    }

    pub fn is_tracking(&self, instance: Instance) -> bool {
        self.tracked(instance).is_some()
    }
}

/// Which instances the tool tracks. Owned by the registry; always pushed whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSettings {
    #[serde(default, deserialize_with = "null_as_default")]
    pub app_list: BTreeMap<Instance, TrackedEntry>,
    #[serde(default)]
    pub updated: String,
}

impl TrackingSettings {
    /// Add or replace one instance and stamp the document.
    pub fn track(&mut self, instance: Instance, entry: TrackedEntry) {
        self.app_list.insert(instance, entry);
        self.touch();
    }

    /// Remove one instance, returning its entry.
    pub fn untrack(&mut self, instance: Instance) -> Option<TrackedEntry> {
        let removed = self.app_list.remove(&instance);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn contains(&self, instance: Instance) -> bool {
        self.app_list.contains_key(&instance)
    }

    /// Fill in `app_dir` on entries written before it existed: the
    /// application root is the work tree minus a trailing `current`.
    pub fn normalize_legacy(&mut self) {
        for entry in self.app_list.values_mut() {
            if entry.app_dir.as_os_str().is_empty() {
                entry.app_dir = leave_current(&entry.work_tree);
            }
        }
    }

    fn touch(&mut self) {
        self.updated = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    }
}

fn leave_current(work_tree: &Path) -> PathBuf {
    if work_tree.file_name().is_some_and(|name| name == "current") {
        work_tree
            .parent()
            .map_or_else(|| work_tree.to_path_buf(), Path::to_path_buf)
    } else {
        work_tree.to_path_buf()
    }
}

/// Tracking metadata for one instance.
///
/// `work_tree` and `app_dir` differ exactly when the application uses the
/// version-symlink convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    #[serde(default)]
    pub app_dir: PathBuf,
    #[serde(default)]
    pub app_name: String,
    #[serde(default, deserialize_with = "flag")]
    pub enabled: bool,
    /// Snapshot-store directory of this instance.
    #[serde(default)]
    pub git_dir: PathBuf,
    #[serde(default)]
    pub work_tree: PathBuf,
}

impl TrackedEntry {
    pub fn new(app_name: &str, work_tree: &Path, app_dir: &Path, git_dir: &Path) -> Self {
        Self {
            app_dir: app_dir.to_path_buf(),
            app_name: app_name.to_string(),
            enabled: true,
            git_dir: git_dir.to_path_buf(),
            work_tree: work_tree.to_path_buf(),
        }
    }

    pub fn is_version_managed(&self) -> bool {
        crate::scanner::version::is_version_managed(&self.work_tree, &self.app_dir)
    }
}

/// Metric collection jobs the registry schedules for this tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricJobSpec {
    #[serde(default, deserialize_with = "numeric_id")]
    pub appl_id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub measurements: Vec<Measurement>,
    #[serde(default)]
    pub product: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub configuration: JobConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfiguration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub commands: Vec<String>,
    #[serde(default)]
    pub data_format: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl MetricJobSpec {
    /// Stamp the spec with the tool's identity.
    pub fn set_owner(&mut self, appl_id: u32, application_name: &str, job: &JobConfig) {
        self.appl_id = appl_id;
        self.description.clone_from(&job.description);
        self.product = application_name.to_string();
        self.service = application_name.to_string();
    }

    /// Add the status job for `instance`, replacing any previous one.
    pub fn upsert_job(&mut self, instance: Instance, command: String, job: &JobConfig) {
        self.remove_job(instance);
        self.measurements.push(Measurement {
            name: job.measurement.clone(),
            configuration: JobConfiguration {
                commands: vec![command],
                data_format: job.data_format.clone(),
                interval: job.interval.clone(),
                timeout: job.timeout.clone(),
                kind: "exec".to_string(),
            },
        });
    }

    /// Remove the job whose first command ends with `instance`.
    pub fn remove_job(&mut self, instance: Instance) -> bool {
        let before = self.measurements.len();
        let wanted = instance.to_string();
        self.measurements
            .retain(|m| m.job_instance().is_none_or(|id| id != wanted));
        self.measurements.len() != before
    }

    /// Instances that currently have a job.
    pub fn job_instances(&self) -> Vec<String> {
        self.measurements
            .iter()
            .filter_map(|m| m.job_instance().map(str::to_string))
            .collect()
    }
}

impl Measurement {
    fn job_instance(&self) -> Option<&str> {
        self.configuration
            .commands
            .first()
            .and_then(|cmd| cmd.split_whitespace().last())
    }
}

/// `null` (what older writers produced for empty collections) decodes as empty.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Text(String),
}

/// Accept JSON booleans and the legacy `"True"`/`"False"` strings.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(value) => Ok(value),
        FlagRepr::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid enabled flag: {other:?}"
            ))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u32),
    Text(String),
}

/// Accept an application id written as a number or a string.
fn numeric_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(value) => Ok(value),
        IdRepr::Text(text) if text.trim().is_empty() => Ok(0),
        IdRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid appl_id: {text:?}"))),
    }
}
