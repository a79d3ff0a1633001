//! Field-by-field registry writes for an `AppRecord`.
//!
//! The write set is an explicit table rather than something derived from the
//! struct layout, so every key the tool can touch is listed here.

#![allow(missing_docs)]

use serde::Serialize;

use crate::core::errors::Result;
use crate::registry::client::Registry;
use crate::registry::model::AppRecord;

/// One writable registry field.
pub struct FieldSpec {
    pub key: &'static str,
    pub should_write: fn(&AppRecord) -> bool,
    pub serialize: fn(&AppRecord) -> Result<String>,
}

/// The complete write table, in registry field order.
pub fn field_table() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            key: "app_dir",
            should_write: |r| !r.app_dir.is_empty(),
            serialize: |r| Ok(r.app_dir.clone()),
        },
        FieldSpec {
            key: "appl_id",
            should_write: |r| !r.appl_id.is_empty(),
            serialize: |r| Ok(r.appl_id.clone()),
        },
        FieldSpec {
            key: "application_name",
            should_write: |r| !r.application_name.is_empty(),
            serialize: |r| Ok(r.application_name.clone()),
        },
        FieldSpec {
            key: "current_version",
            should_write: |r| !r.current_version.is_empty(),
            serialize: |r| Ok(r.current_version.clone()),
        },
        FieldSpec {
            key: "instance",
            should_write: |r| !r.instance.is_empty(),
            serialize: |r| Ok(r.instance.clone()),
        },
        FieldSpec {
            key: "pid_file",
            should_write: |r| !r.pid_file.is_empty(),
            serialize: |r| Ok(r.pid_file.clone()),
        },
        FieldSpec {
            key: "product_name",
            should_write: |r| !r.product_name.is_empty(),
            serialize: |r| Ok(r.product_name.clone()),
        },
        FieldSpec {
            key: "stand",
            should_write: |r| !r.stand.is_empty(),
            serialize: |r| Ok(r.stand.clone()),
        },
        FieldSpec {
            key: "dts_settings",
            should_write: |r| r.dts_settings.is_some(),
            serialize: |r| pretty_json(&r.dts_settings),
        },
        FieldSpec {
            key: "emon_json",
            should_write: |r| r.emon_json.is_some(),
            serialize: |r| pretty_json(&r.emon_json),
        },
    ]
}

/// `(key, value)` pairs that pushing `record` would write.
pub fn planned_writes(record: &AppRecord) -> Result<Vec<(&'static str, String)>> {
    field_table()
        .into_iter()
        .filter(|field| (field.should_write)(record))
        .map(|field| (field.serialize)(record).map(|value| (field.key, value)))
        .collect()
}

/// Write every populated field of `record` under `record_path`.
///
/// Returns the keys written. Stops at the first failed write.
pub fn push_record(
    registry: &dyn Registry,
    record_path: &str,
    record: &AppRecord,
) -> Result<Vec<String>> {
    let mut written = Vec::new();
    for (key, value) in planned_writes(record)? {
        let full_key = format!("{}/{key}", record_path.trim_end_matches('/'));
        registry.put(&full_key, &value)?;
        written.push(full_key);
    }
    Ok(written)
}

/// Pretty JSON with a 4-space indent, the form other registry readers expect.
pub fn pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|err| crate::core::errors::DtsError::Serialization {
        context: "pretty_json",
        details: err.to_string(),
    })
}
