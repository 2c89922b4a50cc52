use crate::asset_cache::AssetCache;
use crate::fingerprint::ContentFingerprinter;
use crate::hosting::AssetMetadata;
use crate::report::{DiffCategory, DiffEntry, FingerprintFailure, ReconcileReport, ReconcileStats};
use crate::scanner::LocalTreeScanner;
use hostdiff_common::{
    AppConfig, AssetDescriptor, CancelToken, HostDiffError, Snapshot, SnapshotSide,
};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_DEFAULT_WORKERS: usize = 8;

/// Knobs for one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub exclude_patterns: Vec<String>,
    pub include_hidden: bool,
    pub follow_symlinks: bool,
    pub metadata: AssetMetadata,
    pub workers: usize,
    /// Re-hash every file instead of trusting the cache
    pub verify_content: bool,
    /// Keep Unchanged rows in the report
    pub include_unchanged: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            include_hidden: false,
            follow_symlinks: true,
            metadata: AssetMetadata::default(),
            workers: default_workers(),
            verify_content: false,
            include_unchanged: false,
        }
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            exclude_patterns: config.exclude_patterns.clone(),
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
            workers: config.workers.filter(|n| *n > 0).unwrap_or_else(default_workers),
            verify_content: config.verify_content,
            ..Self::default()
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Progress callbacks for the fingerprinting phase
pub trait ProgressSink: Send + Sync {
    fn on_start(&self, _total: usize) {}
    fn on_file(&self, _path: &str) {}
    fn on_finish(&self) {}
}

struct NoProgress;

impl ProgressSink for NoProgress {}

enum FileOutcome {
    Hit(AssetDescriptor),
    Hashed(AssetDescriptor),
    Failed(FingerprintFailure),
    Skipped,
}

/// Fingerprints the local tree through the cache and diffs it against a
/// remote snapshot
pub struct ReconciliationEngine {
    options: ReconcileOptions,
    progress: Arc<dyn ProgressSink>,
}

impl ReconciliationEngine {
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            options,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile the files under `root` against `remote`.
    ///
    /// Cache entries stored before a cancellation stay in `cache`; pruning only
    /// happens once every file has been handled.
    pub fn reconcile(
        &self,
        root: &Path,
        cache: &AssetCache,
        remote: &Snapshot,
        cancel: &CancelToken,
    ) -> Result<ReconcileReport, HostDiffError> {
        info!(
            "Reconciling {} against {} remote assets",
            root.display(),
            remote.len()
        );

        let scanner = LocalTreeScanner::new(&self.options.exclude_patterns)
            .include_hidden(self.options.include_hidden)
            .follow_symlinks(self.options.follow_symlinks)
            .with_metadata(self.options.metadata.clone());
        let scanned = scanner.scan(root, cancel)?;

        let mut stats = ReconcileStats {
            scanned: scanned.len(),
            ..ReconcileStats::default()
        };
        let current_paths: HashSet<String> = scanned.iter().map(|a| a.path.clone()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()
            .map_err(|e| HostDiffError::Config(format!("Failed to build worker pool: {e}")))?;

        self.progress.on_start(scanned.len());
        let outcomes: Vec<FileOutcome> = pool.install(|| {
            scanned
                .into_par_iter()
                .map(|asset| {
                    let outcome = self.fingerprint_asset(root, asset, cache, cancel);
                    match &outcome {
                        FileOutcome::Hit(a) | FileOutcome::Hashed(a) => {
                            self.progress.on_file(&a.path)
                        }
                        FileOutcome::Failed(f) => self.progress.on_file(&f.path),
                        FileOutcome::Skipped => {}
                    }
                    outcome
                })
                .collect()
        });
        self.progress.on_finish();

        let mut local = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut skipped = false;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Hit(asset) => {
                    stats.cache_hits += 1;
                    local.push(asset);
                }
                FileOutcome::Hashed(asset) => {
                    stats.cache_misses += 1;
                    local.push(asset);
                }
                FileOutcome::Failed(failure) => failures.push(failure),
                FileOutcome::Skipped => skipped = true,
            }
        }
        if skipped {
            info!("Reconciliation cancelled during fingerprinting");
            return Err(HostDiffError::Cancelled);
        }
        cancel.check()?;

        stats.failed = failures.len();
        stats.pruned = cache.prune(&current_paths);

        let failed: HashSet<String> = failures.iter().map(|f| f.path.clone()).collect();
        let local = Snapshot::new(SnapshotSide::Local, local)?;
        let entries = merge(&local, remote, &failed, self.options.include_unchanged);

        info!(
            "Reconciled {} files ({} cache hits, {} hashed, {} failed): {} added, {} removed, {} modified",
            stats.scanned,
            stats.cache_hits,
            stats.cache_misses,
            stats.failed,
            count(&entries, DiffCategory::Added),
            count(&entries, DiffCategory::Removed),
            count(&entries, DiffCategory::Modified),
        );

        Ok(ReconcileReport {
            entries,
            failures,
            stats,
        })
    }

    fn fingerprint_asset(
        &self,
        root: &Path,
        mut asset: AssetDescriptor,
        cache: &AssetCache,
        cancel: &CancelToken,
    ) -> FileOutcome {
        if cancel.is_cancelled() {
            return FileOutcome::Skipped;
        }

        if !self.options.verify_content {
            if let Some(modified) = asset.modified {
                if let Some(fingerprint) = cache.lookup(&asset.path, asset.size, modified) {
                    debug!("Cache hit for {}", asset.path);
                    asset.fingerprint = Some(fingerprint);
                    return FileOutcome::Hit(asset);
                }
            }
        }

        debug!("Hashing {}", asset.path);
        match ContentFingerprinter::fingerprint_file(&root.join(&asset.path)) {
            Ok((fingerprint, size)) => {
                // A size change means the file was rewritten after the scan
                // and the scanned mtime no longer describes these bytes.
                match asset.modified {
                    Some(modified) if size == asset.size => {
                        cache.store(&asset.path, size, modified, fingerprint)
                    }
                    _ => debug!("Not caching {}: changed while hashing", asset.path),
                }
                asset.size = size;
                asset.fingerprint = Some(fingerprint);
                FileOutcome::Hashed(asset)
            }
            Err(err) => {
                let reason = match err {
                    HostDiffError::Fingerprint { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                warn!("Failed to fingerprint {}: {}", asset.path, reason);
                FileOutcome::Failed(FingerprintFailure {
                    path: asset.path,
                    reason,
                })
            }
        }
    }
}

fn count(entries: &[DiffEntry], category: DiffCategory) -> usize {
    entries.iter().filter(|e| e.category() == category).count()
}

/// Merge two path-ordered snapshots into diff entries, sorted by path.
///
/// Remote paths listed in `failed` are left out: their local counterpart
/// could not be hashed, so nothing is known about them.
pub fn merge(
    local: &Snapshot,
    remote: &Snapshot,
    failed: &HashSet<String>,
    include_unchanged: bool,
) -> Vec<DiffEntry> {
    let (left, right) = (local.assets(), remote.assets());
    let mut entries = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut j) = (0, 0);

    loop {
        let order = match (left.get(i), right.get(j)) {
            (Some(l), Some(r)) => l.path.cmp(&r.path),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match order {
            Ordering::Less => {
                entries.push(DiffEntry::added(left[i].clone()));
                i += 1;
            }
            Ordering::Greater => {
                if !failed.contains(&right[j].path) {
                    entries.push(DiffEntry::removed(right[j].clone()));
                }
                j += 1;
            }
            Ordering::Equal => {
                let entry = DiffEntry::compared(left[i].clone(), right[j].clone());
                if include_unchanged || entry.category() != DiffCategory::Unchanged {
                    entries.push(entry);
                }
                i += 1;
                j += 1;
            }
        }
    }

    entries
}
