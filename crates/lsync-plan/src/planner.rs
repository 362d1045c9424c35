//! Source/destination comparison.

use std::cmp::Reverse;
use std::time::{Duration, SystemTime};

use tracing::debug;

use lsync_core::{
    Entry, EntryKind, ScanResult, SkipReason, SyncAction, SyncConfig, SyncPlan, is_within,
};

/// Compute the actions that make `destination` match `source`.
///
/// Copies, updates and skips come first in path order, so a directory is
/// always created before anything beneath it. Deletions follow, deepest
/// first.
pub fn plan(source: &ScanResult, destination: &ScanResult, config: &SyncConfig) -> SyncPlan {
    Planner::from_config(config).plan(source, destination)
}

/// Comparison policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    /// Emit deletions and allow directories to be replaced.
    pub delete: bool,
    /// Tolerated mtime difference for files without fingerprints.
    pub modify_window: Duration,
}

impl Planner {
    /// Create a planner from a sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            delete: config.delete,
            modify_window: config.modify_window,
        }
    }

    /// Compare two scans.
    pub fn plan(&self, source: &ScanResult, destination: &ScanResult) -> SyncPlan {
        let mut forward = Vec::new();
        let mut replaced_dirs: Vec<&str> = Vec::new();

        for entry in source {
            match destination.get(&entry.path) {
                None => forward.push(SyncAction::Copy(entry.clone())),
                Some(dst) if dst.is_dir() && !entry.is_dir() => {
                    if self.delete {
                        debug!(path = %entry.path, "replacing directory");
                        replaced_dirs.push(&entry.path);
                        forward.push(SyncAction::Update(entry.clone()));
                    } else {
                        forward.push(SyncAction::Skip {
                            path: entry.path.clone(),
                            reason: SkipReason::ReplaceDisabled,
                        });
                    }
                }
                Some(dst) if self.is_stale(entry, dst) => {
                    forward.push(SyncAction::Update(entry.clone()));
                }
                Some(_) => {}
            }
        }

        // Unreadable source paths must not look like deletions.
        let unreadable: Vec<&str> = source
            .issues()
            .iter()
            .map(|issue| issue.path.as_str())
            .filter(|path| !path.is_empty())
            .collect();
        for issue in source.issues() {
            forward.push(SyncAction::Skip {
                path: issue.path.clone(),
                reason: SkipReason::Unreadable(issue.reason.clone()),
            });
        }
        forward.sort_by(|a, b| a.path().cmp(b.path()));

        let mut removals: Vec<&Entry> = destination
            .iter()
            .filter(|dst| !source.contains(&dst.path))
            .filter(|dst| {
                !unreadable
                    .iter()
                    .any(|p| dst.path == *p || is_within(&dst.path, p))
            })
            .filter(|dst| !replaced_dirs.iter().any(|dir| is_within(&dst.path, dir)))
            .collect();
        removals.sort_by(|a, b| {
            (Reverse(a.depth()), Reverse(&a.path)).cmp(&(Reverse(b.depth()), Reverse(&b.path)))
        });

        let mut actions = forward;
        actions.extend(removals.into_iter().map(|dst| {
            if self.delete {
                SyncAction::Delete(dst.clone())
            } else {
                SyncAction::Skip {
                    path: dst.path.clone(),
                    reason: SkipReason::DeleteDisabled,
                }
            }
        }));

        let plan = SyncPlan::new(actions);
        debug!(
            copies = plan.stats().counts.copies,
            updates = plan.stats().counts.updates,
            deletes = plan.stats().counts.deletes,
            skips = plan.stats().counts.skips,
            bytes = plan.stats().bytes_to_transfer,
            "planned"
        );
        plan
    }

    /// Check whether the destination entry no longer matches the source.
    pub fn is_stale(&self, src: &Entry, dst: &Entry) -> bool {
        match (&src.kind, &dst.kind) {
            (EntryKind::Directory, EntryKind::Directory) => false,
            (EntryKind::Symlink { target: a }, EntryKind::Symlink { target: b }) => a != b,
            (EntryKind::File { executable: a }, EntryKind::File { executable: b }) => {
                if a != b {
                    return true;
                }
                // Fingerprints are immune to clock skew, so they decide alone.
                if let (Some(a), Some(b)) = (src.fingerprint, dst.fingerprint) {
                    return a != b;
                }
                src.size != dst.size || mtime_delta(src.modified, dst.modified) > self.modify_window
            }
            _ => true,
        }
    }
}

fn mtime_delta(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b).unwrap_or_else(|err| err.duration())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsync_core::ContentHash;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_mtime_delta_is_symmetric() {
        assert_eq!(mtime_delta(at(10), at(7)), Duration::from_secs(3));
        assert_eq!(mtime_delta(at(7), at(10)), Duration::from_secs(3));
    }

    #[test]
    fn test_file_staleness() {
        let planner = Planner {
            modify_window: Duration::from_secs(1),
            ..Planner::default()
        };
        let src = Entry::file("f", 10, at(100));

        assert!(!planner.is_stale(&src, &Entry::file("f", 10, at(100))));
        assert!(!planner.is_stale(&src, &Entry::file("f", 10, at(101))));
        assert!(planner.is_stale(&src, &Entry::file("f", 10, at(102))));
        assert!(planner.is_stale(&src, &Entry::file("f", 11, at(100))));
        assert!(planner.is_stale(
            &src,
            &Entry::file("f", 10, at(100)).with_executable(true)
        ));
    }

    #[test]
    fn test_fingerprints_override_metadata() {
        let planner = Planner::default();
        let hash = ContentHash::new([1; 32]);

        let src = Entry::file("f", 10, at(100)).with_fingerprint(hash);
        let skewed = Entry::file("f", 10, at(5000)).with_fingerprint(hash);
        assert!(!planner.is_stale(&src, &skewed));

        let changed = Entry::file("f", 10, at(100)).with_fingerprint(ContentHash::new([2; 32]));
        assert!(planner.is_stale(&src, &changed));
    }

    #[test]
    fn test_kind_staleness() {
        let planner = Planner::default();
        let dir = Entry::directory("x", at(1));
        assert!(!planner.is_stale(&dir, &Entry::directory("x", at(999))));
        assert!(planner.is_stale(&dir, &Entry::file("x", 0, at(1))));

        let link = Entry::symlink("x", "a", at(1));
        assert!(!planner.is_stale(&link, &Entry::symlink("x", "a", at(2))));
        assert!(planner.is_stale(&link, &Entry::symlink("x", "b", at(1))));
    }
}
