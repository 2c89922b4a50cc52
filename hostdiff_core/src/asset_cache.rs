//! Persistent fingerprint cache for hosting assets.
//!
//! One cache file per profile holds an entry map per scope (the remote app id).
//! Entries are keyed by the asset's relative path and are only trusted while
//! the file's size and modification time match what was recorded. The file is
//! advisory: a missing, unreadable or corrupt cache is treated as empty.

use fs2::FileExt;
use hostdiff_common::{Fingerprint, HostDiffError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const CACHE_VERSION: u32 = 1;

/// Files modified this close to the moment they were hashed may change again
/// without a visible mtime change on coarse-timestamp filesystems.
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Cached fingerprint of one local file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub size: u64,
    pub modified: SystemTime,
    pub fingerprint: Fingerprint,
    /// When the fingerprint was computed
    pub recorded_at: SystemTime,
}

impl CacheEntry {
    fn matches(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }

    fn is_racy(&self) -> bool {
        match self.recorded_at.duration_since(self.modified) {
            Ok(age) => age < RACY_WINDOW,
            // mtime after the hash was taken
            Err(_) => true,
        }
    }
}

type ScopeEntries = HashMap<String, CacheEntry>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    scopes: HashMap<String, ScopeEntries>,
}

/// Scoped handle on a profile's asset cache.
///
/// `open` takes an exclusive advisory lock that is held until [`AssetCache::close`]
/// or drop. Dropping a cache with unsaved changes persists it first.
pub struct AssetCache {
    cache_file: Option<PathBuf>,
    scope: String,
    entries: RwLock<ScopeEntries>,
    other_scopes: HashMap<String, ScopeEntries>,
    lock: Option<File>,
    dirty: AtomicBool,
}

impl AssetCache {
    /// Open the cache stored at `cache_file` and select `scope`.
    ///
    /// Never fails: if the lock file cannot be created the cache degrades to
    /// memory only, and unreadable contents start an empty cache.
    pub fn open(cache_file: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        let cache_file = cache_file.into();
        let scope = scope.into();

        let lock = match acquire_lock(&cache_file) {
            Ok(lock) => lock,
            Err(e) => {
                let err = HostDiffError::CacheUnavailable(format!(
                    "cannot lock {}: {}",
                    cache_file.display(),
                    e
                ));
                warn!("{}; continuing without a persistent cache", err);
                return Self::in_memory_scope(scope);
            }
        };

        let mut scopes = load_scopes(&cache_file);
        let entries = scopes.remove(&scope).unwrap_or_default();
        debug!(
            "Opened asset cache {} (scope '{}', {} entries)",
            cache_file.display(),
            scope,
            entries.len()
        );

        Self {
            cache_file: Some(cache_file),
            scope,
            entries: RwLock::new(entries),
            other_scopes: scopes,
            lock: Some(lock),
            dirty: AtomicBool::new(false),
        }
    }

    /// A cache that lives only for this process
    pub fn in_memory() -> Self {
        Self::in_memory_scope(String::new())
    }

    fn in_memory_scope(scope: String) -> Self {
        Self {
            cache_file: None,
            scope,
            entries: RwLock::new(HashMap::new()),
            other_scopes: HashMap::new(),
            lock: None,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.cache_file.is_some()
    }

    /// Cached fingerprint for `path`, only if size and mtime match exactly and
    /// the entry is not racy.
    pub fn lookup(&self, path: &str, size: u64, modified: SystemTime) -> Option<Fingerprint> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(path)?;
        if !entry.matches(size, modified) {
            debug!("Stale cache entry for {}", path);
            return None;
        }
        if entry.is_racy() {
            debug!("Racy cache entry for {}, re-hashing", path);
            return None;
        }
        Some(entry.fingerprint)
    }

    /// Upsert the fingerprint of `path`; last write wins.
    pub fn store(&self, path: &str, size: u64, modified: SystemTime, fingerprint: Fingerprint) {
        let entry = CacheEntry {
            size,
            modified,
            fingerprint,
            recorded_at: SystemTime::now(),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(path.to_string(), entry);
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Drop entries whose path is not in `current_paths`. Returns the number removed.
    pub fn prune(&self, current_paths: &HashSet<String>) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|path, _| current_paths.contains(path));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Pruned {} stale cache entries", removed);
            self.dirty.store(true, Ordering::Relaxed);
        }
        removed
    }

    /// Clear all entries of the open scope
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            if !entries.is_empty() {
                entries.clear();
                self.dirty.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Clear every scope in the file, not just the open one
    pub fn clear_all(&mut self) {
        self.other_scopes.clear();
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Entry count per scope, sorted by scope name. Empty scopes are skipped.
    pub fn scope_sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<(String, usize)> = self
            .other_scopes
            .iter()
            .map(|(scope, entries)| (scope.clone(), entries.len()))
            .chain(std::iter::once((self.scope.clone(), self.len())))
            .filter(|(_, len)| *len > 0)
            .collect();
        sizes.sort();
        sizes
    }

    /// Get the number of cached entries in the open scope
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist all scopes to disk atomically
    pub fn persist(&self) -> Result<(), HostDiffError> {
        let Some(cache_file) = self.cache_file.as_ref() else {
            return Ok(());
        };

        let entries = self
            .entries
            .read()
            .map_err(|e| HostDiffError::CacheUnavailable(format!("Lock error: {}", e)))?;

        let mut scopes = self.other_scopes.clone();
        scopes.insert(self.scope.clone(), entries.clone());
        let file = CacheFile {
            version: CACHE_VERSION,
            scopes,
        };

        let data = bincode::serialize(&file)
            .map_err(|e| HostDiffError::Serialization(e.to_string()))?;

        let temp_file = cache_file.with_extension("bin.tmp");
        fs::write(&temp_file, data)?;
        fs::rename(&temp_file, cache_file)?;
        self.dirty.store(false, Ordering::Relaxed);

        debug!("Persisted {} cache entries to disk (atomic)", entries.len());
        Ok(())
    }

    /// Persist pending changes and release the lock.
    pub fn close(mut self) -> Result<(), HostDiffError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), HostDiffError> {
        let result = if self.dirty.load(Ordering::Relaxed) {
            self.persist()
        } else {
            Ok(())
        };

        if let Some(lock) = self.lock.take() {
            let _ = lock.unlock();
        }
        result
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to persist asset cache: {}", e);
        }
    }
}

fn acquire_lock(cache_file: &Path) -> std::io::Result<File> {
    if let Some(parent) = cache_file.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_path = cache_file.with_extension("lock");
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)?;
    lock.lock_exclusive()?;
    Ok(lock)
}

fn load_scopes(cache_file: &Path) -> HashMap<String, ScopeEntries> {
    let data = match fs::read(cache_file) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("Failed to read asset cache {}: {}", cache_file.display(), e);
            return HashMap::new();
        }
    };

    match bincode::deserialize::<CacheFile>(&data) {
        Ok(file) if file.version == CACHE_VERSION => file.scopes,
        Ok(file) => {
            warn!(
                "Ignoring asset cache {} with version {}",
                cache_file.display(),
                file.version
            );
            HashMap::new()
        }
        Err(e) => {
            warn!("Asset cache {} is corrupt, starting empty: {}", cache_file.display(), e);
            HashMap::new()
        }
    }
}
