use crate::{HostDiffError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// BLAKE3 content fingerprint (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex digest. Returns `None` for any other input.
    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = hex::decode(value).ok()?;
        let raw: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(raw))
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A single hosting attribute such as `Content-Type: text/css`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Ordered attribute map.
///
/// Insertion order is kept for display; equality ignores order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. A replaced attribute keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Attribute { name, value }),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names whose value differs between `self` (before) and `after`, as
    /// `(name, before, after)`. Names from `self` come first in their order,
    /// then names only present in `after`.
    pub fn changes<'a>(
        &'a self,
        after: &'a Attributes,
    ) -> Vec<(&'a str, Option<&'a str>, Option<&'a str>)> {
        let mut changes = Vec::new();
        for attr in &self.0 {
            let other = after.get(&attr.name);
            if other != Some(attr.value.as_str()) {
                changes.push((attr.name.as_str(), Some(attr.value.as_str()), other));
            }
        }
        for attr in &after.0 {
            if self.get(&attr.name).is_none() {
                changes.push((attr.name.as_str(), None, Some(attr.value.as_str())));
            }
        }
        changes
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .all(|attr| other.get(&attr.name) == Some(attr.value.as_str()))
    }
}

impl Eq for Attributes {}

impl From<Vec<Attribute>> for Attributes {
    fn from(attrs: Vec<Attribute>) -> Self {
        attrs.into_iter().collect()
    }
}

impl From<Attributes> for Vec<Attribute> {
    fn from(attrs: Attributes) -> Self {
        attrs.0
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for attr in iter {
            attrs.insert(attr.name, attr.value);
        }
        attrs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (name, value) in iter {
            attrs.insert(name, value);
        }
        attrs
    }
}

/// One hosted file as seen by either the local tree or the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Forward-slash path relative to the hosting root, without a leading `/`
    pub path: String,
    pub size: u64,
    pub fingerprint: Option<Fingerprint>,
    /// Local modification time; the remote side does not report one
    pub modified: Option<SystemTime>,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotSide {
    Local,
    Remote,
}

/// Path-ordered set of descriptors from one side of a reconciliation
#[derive(Debug, Clone)]
pub struct Snapshot {
    side: SnapshotSide,
    assets: Vec<AssetDescriptor>,
}

impl Snapshot {
    /// Sorts `assets` by path (byte order) and rejects duplicate paths.
    pub fn new(side: SnapshotSide, mut assets: Vec<AssetDescriptor>) -> Result<Self> {
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = assets.windows(2).find(|pair| pair[0].path == pair[1].path) {
            return Err(HostDiffError::DuplicatePath(pair[0].path.clone()));
        }
        Ok(Self { side, assets })
    }

    pub fn empty(side: SnapshotSide) -> Self {
        Self {
            side,
            assets: Vec::new(),
        }
    }

    pub fn side(&self) -> SnapshotSide {
        self.side
    }

    pub fn assets(&self) -> &[AssetDescriptor] {
        &self.assets
    }

    pub fn get(&self, path: &str) -> Option<&AssetDescriptor> {
        self.assets
            .binary_search_by(|asset| asset.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.assets[idx])
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Asset record as delivered by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "fingerprint", alias = "hash")]
    pub fingerprint_hex: String,
    #[serde(default, alias = "attrs")]
    pub attributes: Attributes,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exclude patterns, gitignore syntax (e.g., "*.map", "drafts/")
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Include dot-files and dot-directories
    #[serde(default)]
    pub include_hidden: bool,

    /// Follow symbolic links while scanning
    #[serde(default = "default_follow_symlinks")]
    pub follow_symlinks: bool,

    /// Fingerprinting worker count; defaults to available parallelism capped at 8
    #[serde(default)]
    pub workers: Option<usize>,

    /// Ignore cached fingerprints and re-hash every file
    #[serde(default)]
    pub verify_content: bool,

    /// Cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Profile whose asset cache is used
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

fn default_follow_symlinks() -> bool {
    true
}

fn default_profile() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            include_hidden: false,
            follow_symlinks: default_follow_symlinks(),
            workers: None,
            verify_content: false,
            cache_dir: None,
            profile: default_profile(),
            portable_mode: false,
        }
    }
}
