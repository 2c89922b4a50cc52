use crate::{RemoteAsset, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLake {
    pub name: String,
}

/// Read-only capabilities of the remote service used by diff previews.
///
/// Implementations report their own failures as `HostDiffError::Upstream`;
/// callers pass them through unchanged. Test doubles implement this trait
/// directly, so every capability a test touches has to be provided.
pub trait RemoteClient: Send + Sync {
    fn groups(&self) -> Result<Vec<Group>>;

    fn clusters(&self, group_id: &str) -> Result<Vec<Cluster>>;

    fn data_lakes(&self, group_id: &str) -> Result<Vec<DataLake>>;

    /// Deployed hosting assets of one application
    fn hosting_assets(&self, group_id: &str, app_id: &str) -> Result<Vec<RemoteAsset>>;
}
