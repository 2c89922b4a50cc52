use hostdiff_common::{Attribute, Attributes, HostDiffError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const HOSTING_DIR: &str = "hosting";
const FILES_DIR: &str = "files";
const METADATA_FILE: &str = "metadata.json";

/// Location of an application's hosting assets
#[derive(Debug, Clone)]
pub struct HostingDir {
    files_dir: PathBuf,
    metadata_file: Option<PathBuf>,
}

impl HostingDir {
    /// Locate `<app_root>/hosting/files` and the optional `metadata.json` beside it.
    pub fn find(app_root: &Path) -> Result<Self, HostDiffError> {
        let hosting = app_root.join(HOSTING_DIR);
        let files_dir = hosting.join(FILES_DIR);
        if !files_dir.is_dir() {
            return Err(HostDiffError::HostingNotFound(files_dir));
        }

        let metadata_file = hosting.join(METADATA_FILE);
        let metadata_file = metadata_file.is_file().then_some(metadata_file);
        debug!(
            "Found hosting files at {} (metadata: {})",
            files_dir.display(),
            metadata_file.is_some()
        );

        Ok(Self {
            files_dir,
            metadata_file,
        })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn metadata_file(&self) -> Option<&Path> {
        self.metadata_file.as_deref()
    }

    /// Load hosting attributes; an absent manifest yields no attributes.
    pub fn load_metadata(&self) -> Result<AssetMetadata, HostDiffError> {
        match &self.metadata_file {
            Some(path) => AssetMetadata::load(path),
            None => Ok(AssetMetadata::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct MetadataRecord {
    path: String,
    #[serde(default)]
    attrs: Vec<Attribute>,
}

/// Hosting attributes declared for local files, keyed by relative path
#[derive(Debug, Clone, Default)]
pub struct AssetMetadata {
    by_path: HashMap<String, Attributes>,
}

impl AssetMetadata {
    pub fn load(path: &Path) -> Result<Self, HostDiffError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data).map_err(|e| match e {
            HostDiffError::Serialization(msg) => {
                HostDiffError::Serialization(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse `[{"path": "/index.html", "attrs": [{"name": .., "value": ..}]}]`
    pub fn from_json(data: &str) -> Result<Self, HostDiffError> {
        let records: Vec<MetadataRecord> =
            serde_json::from_str(data).map_err(|e| HostDiffError::Serialization(e.to_string()))?;

        let mut metadata = Self::default();
        for record in records {
            metadata.insert(&record.path, record.attrs.into());
        }
        Ok(metadata)
    }

    /// Paths may be given with or without the leading `/`.
    pub fn insert(&mut self, path: &str, attributes: Attributes) {
        let key = path.strip_prefix('/').unwrap_or(path).to_string();
        self.by_path.insert(key, attributes);
    }

    pub fn attributes_for(&self, path: &str) -> Attributes {
        self.by_path.get(path).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_requires_files_dir() {
        let temp = TempDir::new().unwrap();
        let err = HostingDir::find(temp.path()).unwrap_err();
        assert!(matches!(err, HostDiffError::HostingNotFound(_)));

        fs::create_dir_all(temp.path().join("hosting/files")).unwrap();
        let hosting = HostingDir::find(temp.path()).unwrap();
        assert_eq!(hosting.files_dir(), temp.path().join("hosting/files"));
        assert!(hosting.metadata_file().is_none());
        assert!(hosting.load_metadata().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_manifest() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("hosting/files")).unwrap();
        fs::write(
            temp.path().join("hosting/metadata.json"),
            r#"[
                {"path": "/style.css", "attrs": [{"name": "Content-Type", "value": "text/css"}]},
                {"path": "img/logo.png", "attrs": [{"name": "Cache-Control", "value": "max-age=3600"}]}
            ]"#,
        )
        .unwrap();

        let metadata = HostingDir::find(temp.path()).unwrap().load_metadata().unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(
            metadata.attributes_for("style.css").get("Content-Type"),
            Some("text/css")
        );
        assert_eq!(
            metadata.attributes_for("img/logo.png").get("Cache-Control"),
            Some("max-age=3600")
        );
        assert!(metadata.attributes_for("missing.txt").is_empty());
    }

    #[test]
    fn test_invalid_manifest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("metadata.json");
        fs::write(&path, "{not json").unwrap();
        let err = AssetMetadata::load(&path).unwrap_err();
        assert!(matches!(err, HostDiffError::Serialization(msg) if msg.contains("metadata.json")));
    }
}
