pub mod asset_cache;
pub mod fingerprint;
pub mod format;
pub mod hosting;
pub mod manifest_client;
pub mod reconcile;
pub mod remote_adapter;
pub mod report;
pub mod scanner;

pub use asset_cache::{AssetCache, CacheEntry};
pub use fingerprint::ContentFingerprinter;
pub use format::{DiffFormatter, JsonLinesFormatter, TextFormatter};
pub use hosting::{AssetMetadata, HostingDir};
pub use manifest_client::{ManifestApp, ManifestClient, RemoteManifest};
pub use reconcile::{ProgressSink, ReconcileOptions, ReconciliationEngine};
pub use remote_adapter::RemoteSnapshotAdapter;
pub use report::{DiffCategory, DiffEntry, FingerprintFailure, ReconcileReport, ReconcileStats};
pub use scanner::LocalTreeScanner;
