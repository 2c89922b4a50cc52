use hostdiff_common::{Cluster, DataLake, Group, HostDiffError, RemoteAsset, RemoteClient};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Deployed state of one application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestApp {
    pub group_id: String,
    pub app_id: String,
    #[serde(default)]
    pub hosting_assets: Vec<RemoteAsset>,
}

/// On-disk export of the remote service state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteManifest {
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Clusters keyed by group id
    #[serde(default)]
    pub clusters: HashMap<String, Vec<Cluster>>,
    /// Data lakes keyed by group id
    #[serde(default)]
    pub data_lakes: HashMap<String, Vec<DataLake>>,
    #[serde(default)]
    pub apps: Vec<ManifestApp>,
}

/// [`RemoteClient`] backed by a JSON manifest instead of the network
#[derive(Debug, Clone)]
pub struct ManifestClient {
    manifest: RemoteManifest,
}

impl ManifestClient {
    pub fn load(path: &Path) -> Result<Self, HostDiffError> {
        let data = fs::read_to_string(path).map_err(|e| {
            HostDiffError::Upstream(format!("failed to read {}: {}", path.display(), e))
        })?;
        let manifest: RemoteManifest = serde_json::from_str(&data).map_err(|e| {
            HostDiffError::Upstream(format!("failed to parse {}: {}", path.display(), e))
        })?;
        debug!(
            "Loaded remote manifest {} ({} apps)",
            path.display(),
            manifest.apps.len()
        );
        Ok(Self::from_manifest(manifest))
    }

    pub fn from_manifest(manifest: RemoteManifest) -> Self {
        Self { manifest }
    }

    pub fn apps(&self) -> &[ManifestApp] {
        &self.manifest.apps
    }

    fn find_app(&self, group_id: &str, app_id: &str) -> Option<&ManifestApp> {
        self.manifest
            .apps
            .iter()
            .find(|app| app.app_id == app_id && (group_id.is_empty() || app.group_id == group_id))
    }
}

impl RemoteClient for ManifestClient {
    fn groups(&self) -> hostdiff_common::Result<Vec<Group>> {
        Ok(self.manifest.groups.clone())
    }

    fn clusters(&self, group_id: &str) -> hostdiff_common::Result<Vec<Cluster>> {
        Ok(self
            .manifest
            .clusters
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    fn data_lakes(&self, group_id: &str) -> hostdiff_common::Result<Vec<DataLake>> {
        Ok(self
            .manifest
            .data_lakes
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    /// An empty `group_id` matches the app in any group.
    fn hosting_assets(
        &self,
        group_id: &str,
        app_id: &str,
    ) -> hostdiff_common::Result<Vec<RemoteAsset>> {
        self.find_app(group_id, app_id)
            .map(|app| app.hosting_assets.clone())
            .ok_or_else(|| {
                HostDiffError::Upstream(format!("app '{}' not found in group '{}'", app_id, group_id))
            })
    }
}
