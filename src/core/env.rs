//! Runtime environment resolved before an action runs: who we are, where the
//! registry lives, and where snapshots are kept.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::config::{Config, RegistryConfig};
use crate::core::errors::{DtsError, Result};
use crate::core::identity::Instance;
use crate::core::paths::clean_path;

/// Test-zone hostnames look like `abc-defg-hij1d`: three short alpha groups,
/// a number and a single trailing zone letter.
fn is_test_zone(hostname: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([a-z]{2,4}-?){3}\d+[a-z]$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(hostname))
}

/// Options that come from the command line rather than the config file.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    pub test_mode: bool,
    pub snapshot_root: Option<PathBuf>,
}

/// Variables resolved at runtime. Serialized whole into the audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_tree: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
    pub hostname: String,
    pub registry_url: String,
    pub apps_path: String,
    pub tool_dir: PathBuf,
    pub snapshot_root: PathBuf,
    pub tool_instance: Instance,
}

impl Environment {
    /// Resolve the environment from config, CLI options and the host.
    pub fn prepare(config: &Config, tool_dir: &Path, options: &EnvOptions) -> Result<Self> {
        let (hostname, registry_url, city, tool_dir) = if options.test_mode {
            let test = &config.test_mode;
            (
                test.hostname.clone(),
                test.registry_url.clone(),
                test.city.clone(),
                test.tool_dir.clone().unwrap_or_else(|| tool_dir.to_path_buf()),
            )
        } else {
            let hostname = short_hostname()?;
            let url = registry_url_for(&hostname, &config.registry);
            let city = city_of(&hostname).to_string();
            (hostname, url, city, tool_dir.to_path_buf())
        };

        let tool_dir = clean_path(&tool_dir);
        let snapshot_root = options
            .snapshot_root
            .clone()
            .or_else(|| config.snapshot.root.clone())
            .map_or_else(|| tool_dir.clone(), |root| clean_path(&root));

        Ok(Self {
            work_tree: None,
            app_dir: None,
            instance: None,
            apps_path: apps_path(&config.registry.apps_path_template, &city, &hostname),
            registry_url,
            hostname,
            tool_instance: Instance::for_path(&tool_dir),
            tool_dir,
            snapshot_root,
        })
    }

    /// Build an environment from explicit coordinates (library callers, tests).
    pub fn explicit(
        hostname: &str,
        registry_url: &str,
        apps_path: &str,
        tool_dir: &Path,
        snapshot_root: &Path,
    ) -> Self {
        let tool_dir = clean_path(tool_dir);
        Self {
            work_tree: None,
            app_dir: None,
            instance: None,
            hostname: hostname.to_string(),
            registry_url: registry_url.to_string(),
            apps_path: apps_path.trim_end_matches('/').to_string(),
            tool_instance: Instance::for_path(&tool_dir),
            tool_dir,
            snapshot_root: clean_path(snapshot_root),
        }
    }

    /// Snapshot directory for one instance.
    pub fn snapshot_dir(&self, instance: Instance) -> PathBuf {
        self.snapshot_root.join(instance.to_string())
    }
}

/// Short host name: everything before the first dot.
pub fn short_hostname() -> Result<String> {
    let raw = raw_hostname()?;
    Ok(raw.split('.').next().unwrap_or_default().to_string())
}

#[cfg(unix)]
fn raw_hostname() -> Result<String> {
    nix::unistd::gethostname()
        .map_err(|errno| DtsError::io("/proc/sys/kernel/hostname", errno.into()))
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn raw_hostname() -> Result<String> {
    std::env::var("COMPUTERNAME").map_err(|_| DtsError::InvalidConfig {
        details: "unable to determine host name".to_string(),
    })
}

/// Registry base URL for a host, unless one is configured explicitly.
pub fn registry_url_for(hostname: &str, registry: &RegistryConfig) -> String {
    if !registry.url.trim().is_empty() {
        return registry.url.trim_end_matches('/').to_string();
    }
    if is_test_zone(hostname)
        && let Some(zone) = hostname.chars().last()
    {
        format!(
            "http://{}{zone}:{}",
            registry.test_zone_host_prefix, registry.port
        )
    } else {
        format!("http://{}:{}", registry.default_host, registry.port)
    }
}

/// City token: hostname up to the first `-`.
pub fn city_of(hostname: &str) -> &str {
    hostname.split('-').next().unwrap_or(hostname)
}

/// Expand the apps-path template.
pub fn apps_path(template: &str, city: &str, hostname: &str) -> String {
    template
        .replace("{city}", city)
        .replace("{hostname}", hostname)
        .trim_end_matches('/')
        .to_string()
}

/// Directory holding the running binary; the default tool directory.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|source| DtsError::io("current_exe", source))?;
    Ok(exe
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf))
}
