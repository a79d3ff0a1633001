//! Line-protocol rendering of a diff report.
//!
//! One line per counted file:
//! `<measurement>,appl_name=<label>,filename=<path> count=<n>`. Binary files
//! have no line count and produce no line.

use crate::snapshot::DiffReport;

/// Measurement name used when none is configured.
pub const DEFAULT_MEASUREMENT: &str = "data-tracking-system";

/// Render `report` as line-protocol lines, ordered by path.
#[must_use]
pub fn format_report(report: &DiffReport, measurement: &str, label: &str) -> Vec<String> {
    let measurement = escape_measurement(measurement);
    let label = escape_tag(label);
    report
        .changes
        .iter()
        .filter(|(path, _)| !report.binaries.contains(path))
        .map(|(path, count)| {
            format!(
                "{measurement},appl_name={label},filename={} count={count}",
                escape_tag(path)
            )
        })
        .collect()
}

/// Escape a tag key or value. Line breaks and tabs are written as `\n`,
/// `\r` and `\t` so one file always renders as one line.
fn escape_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            ',' | ' ' | '=' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_measurement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, ',' | ' ') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
