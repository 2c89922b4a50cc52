use crate::hosting::AssetMetadata;
use hostdiff_common::{AssetDescriptor, CancelToken, HostDiffError};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parallel hosting-tree scanner using jwalk
///
/// Excluded directories are dropped in `process_read_dir`, before jwalk
/// descends into them.
pub struct LocalTreeScanner {
    exclude: Option<Arc<Gitignore>>,
    include_hidden: bool,
    follow_symlinks: bool,
    metadata: Arc<AssetMetadata>,
}

impl LocalTreeScanner {
    pub fn new(exclude_patterns: &[String]) -> Self {
        Self {
            exclude: build_exclude(exclude_patterns).map(Arc::new),
            include_hidden: false,
            follow_symlinks: true,
            metadata: Arc::new(AssetMetadata::default()),
        }
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Attach hosting attributes to scanned files by path
    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    /// Scan `root` and return every included regular file, sorted by path.
    pub fn scan(
        &self,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<AssetDescriptor>, HostDiffError> {
        cancel.check()?;

        let mut assets = Vec::new();
        for asset in self.walk(root)? {
            cancel.check()?;
            assets.push(asset?);
        }
        assets.sort_by(|a, b| a.path.cmp(&b.path));

        debug!("Scanned {} files from {:?}", assets.len(), root);
        Ok(assets)
    }

    /// Lazily walk `root`. Each call starts a fresh traversal.
    ///
    /// Items arrive in traversal order; [`LocalTreeScanner::scan`] sorts them.
    pub fn walk(
        &self,
        root: &Path,
    ) -> Result<impl Iterator<Item = Result<AssetDescriptor, HostDiffError>>, HostDiffError> {
        let root_meta = fs::metadata(root).map_err(|source| HostDiffError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        if !root_meta.is_dir() {
            return Err(HostDiffError::Scan {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }

        let exclude = self.exclude.clone();
        let filter_root = root.to_path_buf();
        let follow_symlinks = self.follow_symlinks;

        let walker = WalkDir::new(root)
            .follow_links(follow_symlinks)
            .skip_hidden(!self.include_hidden)
            .sort(true)
            .process_read_dir(move |depth, dir, _state, children| {
                // The root entry itself is delivered with no depth
                if depth.is_none() {
                    return;
                }

                // Canonical form of every directory on the logical path from
                // the root down to `dir`. A link resolving to any of them is a cycle.
                let chain = if follow_symlinks {
                    canonical_chain(&filter_root, dir)
                } else {
                    Vec::new()
                };

                children.retain_mut(|result| {
                    let entry = match result {
                        Ok(entry) => entry,
                        Err(e) => {
                            let cycle = e.loop_ancestor().is_some()
                                || (follow_symlinks && e.path().map_or(false, is_symlink_cycle));
                            if cycle {
                                warn!("Skipping symlink cycle: {}", e);
                            }
                            return !cycle;
                        }
                    };
                    let path = entry.path();
                    let is_dir = entry.file_type().is_dir();

                    if let (Some(exclude), Ok(relative)) =
                        (exclude.as_ref(), path.strip_prefix(&filter_root))
                    {
                        if exclude.matched(relative, is_dir).is_ignore() {
                            debug!("Excluded {:?}", relative);
                            return false;
                        }
                    }

                    if is_dir && entry.path_is_symlink() && !chain.is_empty() {
                        let target = fs::canonicalize(&path).ok();
                        if target.map_or(false, |target| chain.contains(&target)) {
                            warn!("Skipping symlink cycle at {}", path.display());
                            entry.read_children_path = None;
                            return false;
                        }
                    }

                    true
                });
            });

        let root = root.to_path_buf();
        let metadata = Arc::clone(&self.metadata);

        Ok(walker.into_iter().filter_map(move |result| {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.clone(), Path::to_path_buf);
                    if e.loop_ancestor().is_some() || (follow_symlinks && is_symlink_cycle(&path)) {
                        warn!("Skipping symlink cycle at {}", path.display());
                        return None;
                    }
                    if path == root || path.is_dir() {
                        return Some(Err(scan_error(path, e.to_string())));
                    }
                    // A file entry that cannot be resolved (e.g. a dangling
                    // link) is still reported; hashing it records the failure.
                    warn!("Cannot stat {}: {}", path.display(), e);
                    let relative = normalize_relative(path.strip_prefix(&root).ok()?);
                    return Some(Ok(unreadable_asset(relative, &metadata)));
                }
            };

            if let Some(e) = entry.read_children_error.as_ref() {
                return Some(Err(scan_error(entry.path(), e.to_string())));
            }

            if !entry.file_type().is_file() {
                return None;
            }

            let path = entry.path();
            let relative = match path.strip_prefix(&root) {
                Ok(relative) => normalize_relative(relative),
                Err(_) => return None,
            };

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    return Some(Ok(unreadable_asset(relative, &metadata)));
                }
            };

            let attributes = metadata.attributes_for(&relative);
            Some(Ok(AssetDescriptor {
                path: relative,
                size: meta.len(),
                fingerprint: None,
                // No mtime means the cache is bypassed for this file
                modified: meta.modified().ok(),
                attributes,
            }))
        }))
    }
}

/// Build a Gitignore from exclude patterns
fn build_exclude(patterns: &[String]) -> Option<Gitignore> {
    if patterns.is_empty() {
        return None;
    }

    let mut builder = GitignoreBuilder::new("");
    for pattern in patterns {
        if let Err(err) = builder.add_line(None, pattern) {
            warn!("Ignoring invalid exclude pattern '{}': {}", pattern, err);
        }
    }

    match builder.build() {
        Ok(exclude) => Some(exclude),
        Err(e) => {
            warn!("Failed to build exclude rules: {}", e);
            None
        }
    }
}

/// Descriptor for a file whose metadata is unavailable
fn unreadable_asset(relative: String, metadata: &AssetMetadata) -> AssetDescriptor {
    AssetDescriptor {
        attributes: metadata.attributes_for(&relative),
        path: relative,
        size: 0,
        fingerprint: None,
        modified: None,
    }
}

/// Canonical paths of `dir` and each of its logical ancestors up to `root`
fn canonical_chain(root: &Path, dir: &Path) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if let Ok(real) = fs::canonicalize(path) {
            chain.push(real);
        }
        if path == root {
            break;
        }
        current = path.parent().filter(|parent| parent.starts_with(root));
    }
    chain
}

/// A symlinked directory is a cycle when it resolves to the directory being
/// read or one of its ancestors.
fn links_to_ancestor(link: &Path, real_dir: &Path) -> bool {
    match fs::canonicalize(link) {
        Ok(target) => real_dir.starts_with(&target),
        Err(_) => false,
    }
}

/// Loop check for a path reported by the walker itself
fn is_symlink_cycle(path: &Path) -> bool {
    let is_link = fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return false;
    }
    match path.parent().map(fs::canonicalize) {
        Some(Ok(real_parent)) => links_to_ancestor(path, &real_parent),
        _ => false,
    }
}

/// Relative path with forward slashes regardless of platform
pub(crate) fn normalize_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn scan_error(path: PathBuf, message: String) -> HostDiffError {
    HostDiffError::Scan {
        path,
        source: std::io::Error::new(std::io::ErrorKind::Other, message),
    }
}
