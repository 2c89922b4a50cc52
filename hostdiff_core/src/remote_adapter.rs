use hostdiff_common::{
    AssetDescriptor, Fingerprint, HostDiffError, RemoteAsset, Snapshot, SnapshotSide,
};
use std::collections::HashSet;
use tracing::debug;

/// Converts the remote asset list into a path-ordered remote [`Snapshot`]
pub struct RemoteSnapshotAdapter;

impl RemoteSnapshotAdapter {
    /// Validate and normalize remote assets.
    ///
    /// Any entry with an unusable path or fingerprint rejects the whole list,
    /// since a partial remote view would turn into bogus Added entries.
    pub fn adapt(assets: Vec<RemoteAsset>) -> Result<Snapshot, HostDiffError> {
        let mut seen = HashSet::with_capacity(assets.len());
        let mut descriptors = Vec::with_capacity(assets.len());

        for asset in assets {
            let malformed = |reason: String| HostDiffError::MalformedRemoteAsset {
                path: asset.path.clone(),
                reason,
            };

            let path = normalize_remote_path(&asset.path).map_err(|r| malformed(r.to_string()))?;
            let fingerprint = Fingerprint::from_hex(&asset.fingerprint_hex).ok_or_else(|| {
                malformed(format!("invalid fingerprint '{}'", asset.fingerprint_hex))
            })?;
            if !seen.insert(path.clone()) {
                return Err(malformed("duplicate path".to_string()));
            }

            descriptors.push(AssetDescriptor {
                path,
                size: asset.size,
                fingerprint: Some(fingerprint),
                modified: None,
                attributes: asset.attributes,
            });
        }

        debug!("Adapted {} remote assets", descriptors.len());
        Snapshot::new(SnapshotSide::Remote, descriptors)
    }
}

/// Strip the single leading `/` remote paths carry and reject anything that
/// is empty or could step outside the hosting root.
pub fn normalize_remote_path(path: &str) -> Result<String, &'static str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Err("empty path");
    }
    if trimmed.contains('\\') {
        return Err("backslash in path");
    }
    for segment in trimmed.split('/') {
        match segment {
            "" => return Err("empty path segment"),
            "." | ".." => return Err("path escapes the hosting root"),
            _ => {}
        }
    }
    Ok(trimmed.to_string())
}
