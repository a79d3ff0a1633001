//! Registry transport.
//!
//! `HttpRegistry` talks to a v2 key-value registry over HTTP by shelling out
//! to `curl`; `MemoryRegistry` keeps keys in memory and serves the same
//! node-tree shape, for library callers and tests.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::core::config::RegistryConfig;
use crate::core::errors::{DtsError, Result};
use crate::registry::model::AppRecord;
use crate::registry::push::push_record;
use crate::registry::tree::{AppKey, Node, RegistryTree};

/// Fetch/put access to the registry subtree of one host.
pub trait Registry {
    /// Recursive fetch of the host's apps subtree.
    fn fetch(&self) -> Result<RegistryTree>;

    /// Set one key (absolute registry path) to `value`.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Absolute registry path of the host's apps subtree.
    fn apps_path(&self) -> &str;

    /// Absolute registry path of one application record.
    fn record_path(&self, key: &AppKey) -> String {
        format!("{}/{}", self.apps_path(), key.segment())
    }

    /// Push every populated field of `record` under its record path.
    fn push(&self, key: &AppKey, record: &AppRecord) -> Result<Vec<String>>
    where
        Self: Sized,
    {
        push_record(self, &self.record_path(key), record)
    }
}

/// HTTP registry client backed by the `curl` binary.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: String,
    apps_path: String,
    curl: PathBuf,
    timeout_secs: u64,
    retries: u32,
    backoff: Duration,
}

impl HttpRegistry {
    pub fn new(base_url: &str, apps_path: &str, config: &RegistryConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            apps_path: apps_path.trim_end_matches('/').to_string(),
            curl: config.curl_binary.clone(),
            timeout_secs: config.timeout_secs,
            retries: config.retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Key URL for a registry path.
    pub fn key_url(&self, key: &str) -> String {
        format!("{}/v2/keys{key}", self.base_url)
    }

    fn fetch_url(&self) -> String {
        format!("{}?recursive=true", self.key_url(&self.apps_path))
    }

    fn curl(&self, url: &str, extra: &[String]) -> Result<String> {
        let timeout = self.timeout_secs.to_string();
        let output = Command::new(&self.curl)
            .args(["-sS", "-f", "--max-time", &timeout])
            .args(extra)
            .arg(url)
            .output()
            .map_err(|err| DtsError::Transport {
                url: url.to_string(),
                details: format!("failed to run {}: {err}", self.curl.display()),
            })?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(DtsError::Transport {
                url: url.to_string(),
                details: format!(
                    "curl exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    /// Run `op`, retrying retryable failures with linear backoff.
    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    thread::sleep(self.backoff * attempt);
                }
                other => return other,
            }
        }
    }
}

impl Registry for HttpRegistry {
    fn fetch(&self) -> Result<RegistryTree> {
        let url = self.fetch_url();
        self.with_retry(|| {
            let body = self.curl(&url, &[])?;
            RegistryTree::parse(&body, &url)
        })
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let url = self.key_url(key);
        let extra = [
            "-X".to_string(),
            "PUT".to_string(),
            "--data-urlencode".to_string(),
            format!("value={value}"),
        ];
        self.with_retry(|| self.curl(&url, &extra).map(drop))
    }

    fn apps_path(&self) -> &str {
        &self.apps_path
    }
}

/// In-memory registry. Records every put in order.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    apps_path: String,
    keys: RefCell<BTreeMap<String, String>>,
    puts: RefCell<Vec<(String, String)>>,
}

impl MemoryRegistry {
    pub fn new(apps_path: &str) -> Self {
        Self {
            apps_path: apps_path.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Store `record` under `key` without counting it as a put.
    pub fn seed(&self, key: &AppKey, record: &AppRecord) -> Result<()> {
        let path = self.record_path(key);
        for (field, value) in crate::registry::push::planned_writes(record)? {
            self.keys
                .borrow_mut()
                .insert(format!("{path}/{field}"), value);
        }
        Ok(())
    }

    /// Every put so far, oldest first.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.borrow().clone()
    }

    /// Number of puts to keys ending in `/<field>`.
    pub fn puts_of(&self, field: &str) -> usize {
        let suffix = format!("/{field}");
        self.puts
            .borrow()
            .iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .count()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.keys.borrow().get(key).cloned()
    }
}

impl Registry for MemoryRegistry {
    fn fetch(&self) -> Result<RegistryTree> {
        let prefix = format!("{}/", self.apps_path);
        let mut apps: BTreeMap<String, Vec<Node>> = BTreeMap::new();
        for (key, value) in self.keys.borrow().iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let Some((app, _field)) = rest.split_once('/') else {
                continue;
            };
            apps.entry(app.to_string()).or_default().push(Node {
                key: key.clone(),
                value: value.clone(),
                ..Node::default()
            });
        }

        Ok(RegistryTree {
            action: "get".to_string(),
            node: Node {
                key: self.apps_path.clone(),
                dir: true,
                nodes: apps
                    .into_iter()
                    .map(|(app, nodes)| Node {
                        key: format!("{}/{app}", self.apps_path),
                        dir: true,
                        nodes,
                        ..Node::default()
                    })
                    .collect(),
                ..Node::default()
            },
        })
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.keys
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.puts
            .borrow_mut()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn apps_path(&self) -> &str {
        &self.apps_path
    }
}
