//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DtsError, Result};

/// Full tracker configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub tool: ToolConfig,
    pub snapshot: SnapshotConfig,
    pub job: JobConfig,
    pub deploy: DeployConfig,
    pub logging: LoggingConfig,
    pub test_mode: TestModeConfig,
}

/// Fleet registry coordinates and transport knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Explicit base URL. Empty means "derive from the hostname".
    pub url: String,
    pub port: u16,
    /// Test-zone hosts talk to `<prefix><last hostname char>`.
    pub test_zone_host_prefix: String,
    /// Registry host for every other zone.
    pub default_host: String,
    /// Key path of the per-host application directory.
    /// Placeholders: `{city}`, `{hostname}`.
    pub apps_path_template: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub curl_binary: PathBuf,
}

/// How the tool identifies itself in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub appl_id: u32,
    pub application_name: String,
    /// Installation directory; defaults to the directory of the running binary.
    pub dir: Option<PathBuf>,
    /// Binary name used in generated metric job commands.
    pub binary_name: Option<String>,
}

/// Snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Root holding one snapshot directory per instance; defaults to the tool dir.
    pub root: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub git_binary: PathBuf,
    pub author_name: String,
    pub author_email: String,
}

/// Template for the metric collection job registered per instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JobConfig {
    pub measurement: String,
    pub description: String,
    pub interval: String,
    pub timeout: String,
    pub data_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DeployConfig {
    /// Application ids never onboarded by `deploy`.
    pub excluded_apps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory; defaults to `<tool dir>/logs`.
    pub dir: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub mirror_stderr: bool,
}

/// Fixed coordinates substituted when the CLI runs with `--test`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestModeConfig {
    pub hostname: String,
    pub registry_url: String,
    pub city: String,
    pub tool_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            port: 2500,
            test_zone_host_prefix: "mon-app1".to_string(),
            default_host: "registry.local".to_string(),
            apps_path_template: "/ps/hosts/{city}/{hostname}/apps".to_string(),
            timeout_secs: 5,
            retries: 2,
            retry_backoff_ms: 500,
            curl_binary: PathBuf::from("curl"),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            appl_id: 5118,
            application_name: "DTS".to_string(),
            dir: None,
            binary_name: None,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_file_size_bytes: 1024 * 1024,
            git_binary: PathBuf::from("git"),
            author_name: "data-tracking-system".to_string(),
            author_email: "dts@localhost".to_string(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            measurement: "data-tracking-system".to_string(),
            description: "data-tracking-system".to_string(),
            interval: "5m".to_string(),
            timeout: "30s".to_string(),
            data_format: "influx".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_bytes: 5 * 1024 * 1024,
            mirror_stderr: true,
        }
    }
}

impl Default for TestModeConfig {
    fn default() -> Self {
        Self {
            hostname: "tst-app-host1d".to_string(),
            registry_url: "http://127.0.0.1:2379".to_string(),
            city: "test".to_string(),
            tool_dir: None,
        }
    }
}

impl Config {
    /// Default configuration path under a tool directory.
    #[must_use]
    pub fn default_path(tool_dir: &Path) -> PathBuf {
        tool_dir.join("config").join("dts.toml")
    }

    /// Load config from the default or an explicit path, apply env overrides,
    /// then validate.
    ///
    /// Missing config file is not an error when loading from the default path.
    pub fn load(path: Option<&Path>, tool_dir: &Path) -> Result<Self> {
        let cfg = Self::read(path, tool_dir)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// [`Config::load`] without the validation step, for callers that need
    /// the log settings of a config that may still be rejected.
    pub fn read(path: Option<&Path>, tool_dir: &Path) -> Result<Self> {
        let path_buf = path.map_or_else(|| Self::default_path(tool_dir), Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DtsError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(DtsError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        Ok(cfg)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DTS_REGISTRY_URL") {
            self.registry.url = raw;
        }
        if let Some(raw) = lookup("DTS_REGISTRY_PORT") {
            self.registry.port = parse_env("DTS_REGISTRY_PORT", &raw)?;
        }
        if let Some(raw) = lookup("DTS_REGISTRY_APPS_PATH_TEMPLATE") {
            self.registry.apps_path_template = raw;
        }
        if let Some(raw) = lookup("DTS_REGISTRY_TIMEOUT_SECS") {
            self.registry.timeout_secs = parse_env("DTS_REGISTRY_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("DTS_REGISTRY_RETRIES") {
            self.registry.retries = parse_env("DTS_REGISTRY_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("DTS_TOOL_DIR") {
            self.tool.dir = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("DTS_SNAPSHOT_ROOT") {
            self.snapshot.root = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("DTS_SNAPSHOT_MAX_FILE_SIZE_BYTES") {
            self.snapshot.max_file_size_bytes =
                parse_env("DTS_SNAPSHOT_MAX_FILE_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("DTS_GIT_BINARY") {
            self.snapshot.git_binary = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DTS_DEPLOY_EXCLUDED_APPS") {
            self.deploy.excluded_apps = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("DTS_LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("DTS_LOG_MAX_SIZE_BYTES") {
            self.logging.max_size_bytes = parse_env("DTS_LOG_MAX_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("DTS_LOG_MIRROR_STDERR") {
            self.logging.mirror_stderr = parse_env("DTS_LOG_MIRROR_STDERR", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.registry.apps_path_template.contains("{hostname}") {
            return Err(DtsError::InvalidConfig {
                details: "registry.apps_path_template must contain {hostname}".to_string(),
            });
        }
        if !self.registry.apps_path_template.starts_with('/') {
            return Err(DtsError::InvalidConfig {
                details: "registry.apps_path_template must be an absolute key path".to_string(),
            });
        }
        if self.registry.retries > 10 {
            return Err(DtsError::InvalidConfig {
                details: format!("registry.retries must be <= 10, got {}", self.registry.retries),
            });
        }
        if self.registry.timeout_secs == 0 {
            return Err(DtsError::InvalidConfig {
                details: "registry.timeout_secs must be > 0".to_string(),
            });
        }
        if self.snapshot.max_file_size_bytes == 0 || self.logging.max_size_bytes == 0 {
            return Err(DtsError::InvalidConfig {
                details: "snapshot.max_file_size_bytes and logging.max_size_bytes must be > 0"
                    .to_string(),
            });
        }
        if self.tool.application_name.trim().is_empty() || self.job.measurement.trim().is_empty() {
            return Err(DtsError::InvalidConfig {
                details: "tool.application_name and job.measurement must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| DtsError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
