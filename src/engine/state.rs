//! Per-run state, serialized whole into the audit log.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::env::Environment;
use crate::core::errors::DtsError;
use crate::core::identity::Instance;
use crate::registry::model::AppRecord;
use crate::scanner::walker::FileClassification;
use crate::snapshot::DiffReport;

/// The single action one invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start tracking one application directory.
    Init,
    /// Report changed lines of one tracked instance.
    Status,
    /// Start tracking every untracked application on this host.
    Deploy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Status => "status",
            Self::Deploy => "deploy",
        })
    }
}

/// Arguments as the caller supplied them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArgs {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_tree: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub test: bool,
}

/// A version-managed instance found redeployed during `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub instance: Instance,
    pub previous_work_tree: PathBuf,
    pub work_tree: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub args: RunArgs,
    pub env: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_app: Option<AppRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_app: Option<AppRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<Instance, FileClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed: Vec<Instance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pushed_keys: Vec<String>,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl RunState {
    pub fn new(args: RunArgs, env: Environment) -> Self {
        Self {
            args,
            env,
            tool_app: None,
            target_app: None,
            files: BTreeMap::new(),
            diff: None,
            drift: None,
            deployed: Vec::new(),
            pushed_keys: Vec::new(),
            time: chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            error: None,
            error_code: None,
        }
    }

    /// Attach the error that ended the run.
    pub fn record_error(&mut self, err: &DtsError) {
        self.record_failure(err.to_string(), Some(err.code()));
    }

    /// Attach a failure that may not carry an error code (bad CLI input).
    pub fn record_failure(&mut self, message: String, code: Option<&str>) {
        self.error = Some(message);
        self.error_code = code.map(str::to_string);
    }
}
