use hostdiff_common::{AssetDescriptor, Attributes, Fingerprint};
use serde::Serialize;

/// How a path differs between the local tree and the deployed app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffCategory {
    /// Present locally only
    Added,
    /// Present remotely only
    Removed,
    /// Content or attributes differ
    Modified,
    Unchanged,
}

impl DiffCategory {
    pub fn marker(&self) -> &'static str {
        match self {
            DiffCategory::Added => "+",
            DiffCategory::Removed => "-",
            DiffCategory::Modified => "~",
            DiffCategory::Unchanged => " ",
        }
    }
}

/// One reconciled path. Built by the engine only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    path: String,
    category: DiffCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_attributes: Option<Attributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_attributes: Option<Attributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_fingerprint: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_fingerprint: Option<Fingerprint>,
}

impl DiffEntry {
    pub(crate) fn added(local: AssetDescriptor) -> Self {
        Self {
            path: local.path,
            category: DiffCategory::Added,
            local_attributes: Some(local.attributes),
            remote_attributes: None,
            local_fingerprint: local.fingerprint,
            remote_fingerprint: None,
        }
    }

    pub(crate) fn removed(remote: AssetDescriptor) -> Self {
        Self {
            path: remote.path,
            category: DiffCategory::Removed,
            local_attributes: None,
            remote_attributes: Some(remote.attributes),
            local_fingerprint: None,
            remote_fingerprint: remote.fingerprint,
        }
    }

    /// Both sides hold the path: content first, then attributes.
    pub(crate) fn compared(local: AssetDescriptor, remote: AssetDescriptor) -> Self {
        let category = if local.fingerprint != remote.fingerprint
            || local.attributes != remote.attributes
        {
            DiffCategory::Modified
        } else {
            DiffCategory::Unchanged
        };

        Self {
            path: local.path,
            category,
            local_attributes: Some(local.attributes),
            remote_attributes: Some(remote.attributes),
            local_fingerprint: local.fingerprint,
            remote_fingerprint: remote.fingerprint,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn category(&self) -> DiffCategory {
        self.category
    }

    pub fn local_attributes(&self) -> Option<&Attributes> {
        self.local_attributes.as_ref()
    }

    pub fn remote_attributes(&self) -> Option<&Attributes> {
        self.remote_attributes.as_ref()
    }

    pub fn local_fingerprint(&self) -> Option<Fingerprint> {
        self.local_fingerprint
    }

    pub fn remote_fingerprint(&self) -> Option<Fingerprint> {
        self.remote_fingerprint
    }

    /// Modified only because of attributes; the bytes are identical.
    pub fn is_attribute_only(&self) -> bool {
        self.category == DiffCategory::Modified
            && self.local_fingerprint.is_some()
            && self.local_fingerprint == self.remote_fingerprint
    }

    /// Attribute differences as `(name, remote value, local value)`.
    pub fn attribute_changes(&self) -> Vec<(&str, Option<&str>, Option<&str>)> {
        match (&self.remote_attributes, &self.local_attributes) {
            (Some(remote), Some(local)) => remote.changes(local),
            _ => Vec::new(),
        }
    }
}

/// A scanned file that could not be hashed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub scanned: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub pruned: usize,
    pub failed: usize,
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<DiffEntry>,
    pub failures: Vec<FingerprintFailure>,
    pub stats: ReconcileStats,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.category != DiffCategory::Unchanged)
    }

    /// Nothing to deploy and nothing went wrong.
    pub fn is_clean(&self) -> bool {
        !self.has_changes() && self.failures.is_empty()
    }

    pub fn count(&self, category: DiffCategory) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.category == category)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ContentFingerprinter;

    fn asset(path: &str, content: &[u8], attributes: Attributes) -> AssetDescriptor {
        AssetDescriptor {
            path: path.to_string(),
            size: content.len() as u64,
            fingerprint: Some(ContentFingerprinter::fingerprint_bytes(content)),
            modified: None,
            attributes,
        }
    }

    #[test]
    fn test_compared_categories() {
        let css = Attributes::new().with("Content-Type", "text/css");
        let plain = Attributes::new().with("Content-Type", "text/plain");

        let same = DiffEntry::compared(
            asset("a.css", b"x", css.clone()),
            asset("a.css", b"x", css.clone()),
        );
        assert_eq!(same.category(), DiffCategory::Unchanged);

        let content = DiffEntry::compared(
            asset("a.css", b"x", css.clone()),
            asset("a.css", b"y", css.clone()),
        );
        assert_eq!(content.category(), DiffCategory::Modified);
        assert!(!content.is_attribute_only());

        let attrs = DiffEntry::compared(asset("a.css", b"x", plain), asset("a.css", b"x", css));
        assert_eq!(attrs.category(), DiffCategory::Modified);
        assert!(attrs.is_attribute_only());
        assert_eq!(
            attrs.attribute_changes(),
            vec![("Content-Type", Some("text/css"), Some("text/plain"))]
        );
    }

    #[test]
    fn test_report_counts() {
        let report = ReconcileReport {
            entries: vec![
                DiffEntry::added(asset("b", b"2", Attributes::new())),
                DiffEntry::removed(asset("c", b"3", Attributes::new())),
            ],
            failures: Vec::new(),
            stats: ReconcileStats::default(),
        };
        assert!(report.has_changes());
        assert!(!report.is_clean());
        assert_eq!(report.count(DiffCategory::Added), 1);
        assert_eq!(report.count(DiffCategory::Modified), 0);
        assert!(ReconcileReport::default().is_clean());
    }
}
