use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A directory under the hosting root could not be read. Fatal for the run.
    #[error("Failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A scanned file could not be read back for hashing.
    #[error("Failed to fingerprint {}: {source}", .path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed remote asset '{path}': {reason}")]
    MalformedRemoteAsset { path: String, reason: String },

    #[error("Duplicate path in snapshot: {0}")]
    DuplicatePath(String),

    #[error("Asset cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Hosting directory not found: {}", .0.display())]
    HostingNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Remote service error: {0}")]
    Upstream(String),
}

impl HostDiffError {
    /// True for the cooperative-cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, HostDiffError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, HostDiffError>;
