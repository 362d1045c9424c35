//! JWalk-based parallel directory scanner.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jwalk::{DirEntry, Parallelism, WalkDir};
use tracing::{debug, info};

use lsync_core::{
    Entry, STATE_DIR_NAME, ScanIssue, ScanResult, SyncConfig, SyncError, VCS_DIR_NAMES,
};

use crate::fingerprint::fingerprint_entries;
use crate::ignore::IgnoreRuleSet;

/// Options that shape a scan independently of ignore rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Compute content fingerprints for regular files.
    pub checksum: bool,
    /// Keep version-control metadata directories.
    pub include_vcs: bool,
    /// Number of walker threads (0 = rayon default pool).
    pub threads: usize,
}

impl ScanOptions {
    /// Derive scan options from a sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            checksum: config.checksum,
            include_vcs: config.include_vcs,
            threads: 0,
        }
    }

    /// Check whether `path` is excluded regardless of ignore rules.
    ///
    /// The state directory is reserved at the root only; VCS directories at
    /// any depth unless `include_vcs` is set.
    pub fn is_reserved(&self, path: &str) -> bool {
        let mut components = path.split('/');
        let Some(first) = components.next() else {
            return false;
        };
        if first == STATE_DIR_NAME {
            return true;
        }
        if self.include_vcs {
            return false;
        }
        std::iter::once(first)
            .chain(components)
            .any(|c| VCS_DIR_NAMES.contains(&c))
    }
}

/// Scanner for a local directory tree.
pub struct LocalScanner {
    root: PathBuf,
    rules: Arc<IgnoreRuleSet>,
    options: ScanOptions,
}

impl LocalScanner {
    /// Create a scanner for `root` filtered by `rules`.
    pub fn new(root: impl Into<PathBuf>, rules: Arc<IgnoreRuleSet>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            rules,
            options,
        }
    }

    /// Root directory being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the tree in depth-first pre-order with siblings sorted
    /// by name.
    ///
    /// A directory's contents follow it directly, so `a/x` comes before a
    /// sibling `a.txt`. The order is deterministic but not lexicographic by
    /// path; use [`LocalScanner::scan`] for that.
    ///
    /// Excluded directories are pruned before they are read. Problems with
    /// individual entries are yielded as [`ScanIssue`]s.
    pub fn entries(
        &self,
    ) -> Result<impl Iterator<Item = Result<Entry, ScanIssue>> + use<>, SyncError> {
        let metadata =
            std::fs::metadata(&self.root).map_err(|e| SyncError::io(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(SyncError::NotADirectory {
                path: self.root.clone(),
            });
        }

        let parallelism = match self.options.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let root = self.root.clone();
        let prune_root = self.root.clone();
        let rules = Arc::clone(&self.rules);
        let options = self.options.clone();

        let walker = WalkDir::new(&self.root)
            .parallelism(parallelism)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1)
            .process_read_dir(move |_depth, _dir, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => {
                        let Some(rel) = relative_path(&prune_root, &entry.path()) else {
                            return true;
                        };
                        let is_dir = entry.file_type().is_dir();
                        !(options.is_reserved(&rel) || rules.excludes(&rel, is_dir))
                    }
                    Err(_) => true,
                });
            });

        Ok(walker
            .into_iter()
            .filter_map(move |item| match item {
                Ok(entry) => to_entry(&root, &entry),
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| relative_path(&root, p))
                        .unwrap_or_default();
                    Some(Err(ScanIssue::new(path, format!("read error: {err}"))))
                }
            }))
    }

    /// Scan the whole tree into a [`ScanResult`], ordered by path.
    ///
    /// With checksums enabled, regular files are fingerprinted afterwards in
    /// parallel.
    pub fn scan(&self) -> Result<ScanResult, SyncError> {
        let mut result = ScanResult::new();
        for item in self.entries()? {
            match item {
                Ok(entry) => {
                    result.insert(entry);
                }
                Err(issue) => {
                    debug!(path = %issue.path, reason = %issue.reason, "scan issue");
                    result.push_issue(issue);
                }
            }
        }

        if self.options.checksum {
            fingerprint_entries(&self.root, &mut result);
        }

        info!(
            root = %self.root.display(),
            entries = result.len(),
            issues = result.issues().len(),
            "scan complete"
        );
        Ok(result)
    }
}

/// Convert a walker entry into an [`Entry`], or `None` for special files.
fn to_entry(root: &Path, dir_entry: &DirEntry<((), ())>) -> Option<Result<Entry, ScanIssue>> {
    let path = dir_entry.path();
    let Some(rel) = relative_path(root, &path) else {
        let display = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
        return Some(Err(ScanIssue::new(display, "file name is not valid UTF-8")));
    };

    let metadata = match std::fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(err) => return Some(Err(ScanIssue::read_error(rel, &err))),
    };
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        Some(Ok(Entry::directory(rel, modified)))
    } else if file_type.is_file() {
        Some(Ok(
            Entry::file(rel, metadata.len(), modified).with_executable(is_executable(&metadata))
        ))
    } else if file_type.is_symlink() {
        match std::fs::read_link(&path) {
            Ok(target) => match target.to_str() {
                Some(target) => Some(Ok(Entry::symlink(rel, target, modified))),
                None => Some(Err(ScanIssue::new(rel, "symlink target is not valid UTF-8"))),
            },
            Err(err) => Some(Err(ScanIssue::read_error(rel, &err))),
        }
    } else {
        debug!(path = %rel, "skipping special file");
        None
    }
}

/// Root-relative, `/`-separated path, or `None` if not valid UTF-8.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_str()?);
    }
    Some(out)
}

/// Check if a file is executable (Unix).
#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}
