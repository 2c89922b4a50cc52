use crate::report::{DiffCategory, DiffEntry, FingerprintFailure, ReconcileReport};
use serde_json::{json, Value};

const NONE_VALUE: &str = "(none)";

/// Renders a reconciliation report into display lines
pub trait DiffFormatter {
    fn format_entry(&self, entry: &DiffEntry) -> Vec<String>;

    fn format_failure(&self, failure: &FingerprintFailure) -> String;

    fn format_entries(&self, entries: &[DiffEntry]) -> Vec<String> {
        entries
            .iter()
            .flat_map(|entry| self.format_entry(entry))
            .collect()
    }

    /// Entries first, then failures.
    fn format(&self, report: &ReconcileReport) -> Vec<String> {
        let mut lines = self.format_entries(&report.entries);
        lines.extend(report.failures.iter().map(|f| self.format_failure(f)));
        lines
    }
}

/// `+ path`, `- path`, `~ path` with indented attribute changes
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl DiffFormatter for TextFormatter {
    fn format_entry(&self, entry: &DiffEntry) -> Vec<String> {
        let mut lines = vec![format!("{} {}", entry.category().marker(), entry.path())];
        if entry.is_attribute_only() {
            for (name, before, after) in entry.attribute_changes() {
                lines.push(format!(
                    "    {}: {} -> {}",
                    name,
                    before.unwrap_or(NONE_VALUE),
                    after.unwrap_or(NONE_VALUE)
                ));
            }
        }
        lines
    }

    fn format_failure(&self, failure: &FingerprintFailure) -> String {
        format!("! {} ({})", failure.path, failure.reason)
    }
}

/// One JSON object per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesFormatter;

impl JsonLinesFormatter {
    fn entry_value(entry: &DiffEntry) -> Value {
        let mut value = json!({
            "path": entry.path(),
            "category": entry.category(),
        });
        if let Some(fp) = entry.local_fingerprint() {
            value["local_fingerprint"] = json!(fp.to_hex());
        }
        if let Some(fp) = entry.remote_fingerprint() {
            value["remote_fingerprint"] = json!(fp.to_hex());
        }
        if entry.category() == DiffCategory::Modified {
            let changes: Vec<Value> = entry
                .attribute_changes()
                .into_iter()
                .map(|(name, remote, local)| json!({ "name": name, "remote": remote, "local": local }))
                .collect();
            if !changes.is_empty() {
                value["attribute_changes"] = Value::Array(changes);
            }
        }
        value
    }
}

impl DiffFormatter for JsonLinesFormatter {
    fn format_entry(&self, entry: &DiffEntry) -> Vec<String> {
        vec![serde_json::to_string(&Self::entry_value(entry)).unwrap_or_default()]
    }

    fn format_failure(&self, failure: &FingerprintFailure) -> String {
        serde_json::to_string(&json!({
            "path": failure.path,
            "category": "failed",
            "reason": failure.reason,
        }))
        .unwrap_or_default()
    }
}
