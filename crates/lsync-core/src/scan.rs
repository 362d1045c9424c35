//! Scan results keyed by relative path.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Non-fatal problem with one entry encountered while scanning.
///
/// The entry is left out of the scan and surfaces as a skip in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    /// Root-relative path (or best-effort display path).
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ScanIssue {
    /// Create a new scan issue.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an issue from an I/O error.
    pub fn read_error(path: impl Into<String>, error: &std::io::Error) -> Self {
        Self::new(path, format!("read error: {error}"))
    }
}

/// Entries of one scanned root, ordered lexicographically by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    entries: BTreeMap<String, Entry>,
    issues: Vec<ScanIssue>,
}

impl ScanResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry at the same path.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    /// Remove an entry by path.
    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    /// Record a non-fatal issue.
    pub fn push_issue(&mut self, issue: ScanIssue) {
        self.issues.push(issue);
    }

    /// Look up an entry by relative path.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Mutable lookup by relative path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.entries.get_mut(path)
    }

    /// Check whether a path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Iterate entries in path order.
    pub fn iter(&self) -> btree_map::Values<'_, String, Entry> {
        self.entries.values()
    }

    /// Issues recorded during the scan, in discovery order.
    pub fn issues(&self) -> &[ScanIssue] {
        &self.issues
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries were found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of regular files.
    pub fn total_size(&self) -> u64 {
        self.entries
            .values()
            .filter(|e| e.is_file())
            .map(|e| e.size)
            .sum()
    }
}

impl FromIterator<Entry> for ScanResult {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut result = Self::new();
        for entry in iter {
            result.insert(entry);
        }
        result
    }
}

impl<'a> IntoIterator for &'a ScanResult {
    type Item = &'a Entry;
    type IntoIter = btree_map::Values<'a, String, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn test_entries_ordered_by_path() {
        let result: ScanResult = [
            Entry::file("b/b1.txt", 20, SystemTime::UNIX_EPOCH),
            Entry::file("a.txt", 10, SystemTime::UNIX_EPOCH),
            Entry::directory("b", SystemTime::UNIX_EPOCH),
        ]
        .into_iter()
        .collect();

        let paths: Vec<_> = result.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b", "b/b1.txt"]);
        assert_eq!(result.total_size(), 30);
    }

    #[test]
    fn test_insert_replaces() {
        let mut result = ScanResult::new();
        result.insert(Entry::file("a", 1, SystemTime::UNIX_EPOCH));
        let old = result.insert(Entry::file("a", 2, SystemTime::UNIX_EPOCH));
        assert_eq!(old.map(|e| e.size), Some(1));
        assert_eq!(result.len(), 1);
    }
}
