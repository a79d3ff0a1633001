//! Registry node tree: the recursive `{key, value, nodes}` document returned by
//! a recursive GET, and the projections the engine needs out of it.
//!
//! Application subtrees are keyed `<apps path>/<applId>.<instance>`; each child
//! node holds one record field, the leaf name being the field name.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{DtsError, Result};
use crate::core::identity::Instance;
use crate::registry::model::{AppRecord, MetricJobSpec, TrackingSettings};

/// Top-level registry response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTree {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub node: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

impl Node {
    /// Last path segment of the key.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Registry coordinates of one application subtree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppKey {
    pub appl_id: String,
    pub instance: Instance,
}

impl AppKey {
    /// Parse `<applId>.<instance>`; `None` for anything else.
    pub fn parse(segment: &str) -> Option<Self> {
        let (appl_id, instance) = segment.split_once('.')?;
        if appl_id.is_empty() || !appl_id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            appl_id: appl_id.to_string(),
            instance: Instance::parse(instance)?,
        })
    }

    /// Record path relative to the apps path.
    pub fn segment(&self) -> String {
        format!("{}.{}", self.appl_id, self.instance)
    }
}

impl RegistryTree {
    /// Parse a raw registry response; `source` names where it came from.
    pub fn parse(raw: &str, source: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| DtsError::Transport {
            url: source.to_string(),
            details: format!("unparseable registry response: {err}"),
        })
    }

    /// Application subtrees with their parsed coordinates, malformed keys skipped.
    pub fn apps(&self) -> impl Iterator<Item = (AppKey, &Node)> {
        self.node
            .nodes
            .iter()
            .filter_map(|node| AppKey::parse(node.name()).map(|key| (key, node)))
    }

    /// Every application key in the tree, sorted.
    pub fn app_keys(&self) -> Vec<AppKey> {
        let mut keys: Vec<AppKey> = self.apps().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }

    /// Record of the first application registered under `instance`.
    pub fn find_app(&self, instance: Instance) -> Result<Option<(AppKey, AppRecord)>> {
        for (key, node) in self.apps() {
            if key.instance == instance {
                return record_from_node(node).map(|record| Some((key, record)));
            }
        }
        Ok(None)
    }

    /// Like `find_app`, restricted to one application id.
    pub fn find_app_with_id(
        &self,
        appl_id: &str,
        instance: Instance,
    ) -> Result<Option<(AppKey, AppRecord)>> {
        for (key, node) in self.apps() {
            if key.instance == instance && key.appl_id == appl_id {
                return record_from_node(node).map(|record| Some((key, record)));
            }
        }
        Ok(None)
    }

    /// Deploy candidates: applications whose id is not excluded, sorted.
    pub fn candidates(&self, excluded: &[String]) -> Vec<AppKey> {
        self.app_keys()
            .into_iter()
            .filter(|key| !excluded.iter().any(|id| id == &key.appl_id))
            .collect()
    }
}

/// Project one application subtree onto an `AppRecord`.
///
/// Field names are matched explicitly; this list and `push::field_table` are
/// the compatibility contract with other registry writers. Unknown fields are
/// ignored.
pub fn record_from_node(node: &Node) -> Result<AppRecord> {
    let mut record = AppRecord::default();
    for child in &node.nodes {
        let value = child.value.clone();
        match child.name() {
            "app_dir" => record.app_dir = value,
            "appl_id" => record.appl_id = value,
            "application_name" => record.application_name = value,
            "current_version" => record.current_version = value,
            "instance" => record.instance = value,
            "pid_file" => record.pid_file = value,
            "product_name" => record.product_name = value,
            "stand" => record.stand = value,
            "dts_settings" if !value.trim().is_empty() => {
                let mut settings: TrackingSettings = parse_document(&child.key, &value)?;
                settings.normalize_legacy();
                record.dts_settings = Some(settings);
            }
            "emon_json" if !value.trim().is_empty() => {
                record.emon_json = Some(parse_document::<MetricJobSpec>(&child.key, &value)?);
            }
            _ => {}
        }
    }
    Ok(record)
}

fn parse_document<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(&normalize_document(raw)).map_err(|err| DtsError::Malformed {
        key: key.to_string(),
        details: err.to_string(),
    })
}

/// Strip whitespace outside string literals and escape raw control
/// characters inside them.
pub fn normalize_document(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in raw.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
            } else if ch == '\\' {
                escaped = true;
                out.push(ch);
            } else if ch == '"' {
                in_string = false;
                out.push(ch);
            } else if ch.is_control() {
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push_str(&format!("\\u{:04x}", u32::from(other))),
                }
            } else {
                out.push(ch);
            }
        } else if ch == '"' {
            in_string = true;
            out.push(ch);
        } else if !ch.is_whitespace() {
            out.push(ch);
        }
    }
    out
}
