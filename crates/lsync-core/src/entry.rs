//! Filesystem entry types.

use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// BLAKE3 content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Type of a synchronized entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    File {
        /// Whether the file is executable.
        executable: bool,
    },
    /// Directory.
    Directory,
    /// Symbolic link, recorded but never followed.
    Symlink {
        /// Link target as stored in the link.
        target: CompactString,
    },
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File { .. })
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, EntryKind::Symlink { .. })
    }

    /// Check whether two kinds describe the same sort of object.
    pub fn same_type(&self, other: &EntryKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::File { .. } => "file",
            EntryKind::Directory => "dir",
            EntryKind::Symlink { .. } => "symlink",
        }
    }
}

/// One filesystem object under a sync root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Root-relative path, `/`-separated, never empty.
    pub path: String,

    /// Object kind and kind-specific metadata.
    pub kind: EntryKind,

    /// Size in bytes (0 for directories).
    pub size: u64,

    /// Last modification time.
    pub modified: SystemTime,

    /// Content fingerprint, present when checksums were requested.
    pub fingerprint: Option<ContentHash>,
}

impl Entry {
    /// Create a regular file entry.
    pub fn file(path: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File { executable: false },
            size,
            modified,
            fingerprint: None,
        }
    }

    /// Create a directory entry.
    pub fn directory(path: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified,
            fingerprint: None,
        }
    }

    /// Create a symlink entry.
    pub fn symlink(
        path: impl Into<String>,
        target: impl Into<CompactString>,
        modified: SystemTime,
    ) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Symlink {
                target: target.into(),
            },
            size: 0,
            modified,
            fingerprint: None,
        }
    }

    /// Attach a content fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: ContentHash) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Mark a file entry executable.
    pub fn with_executable(mut self, executable: bool) -> Self {
        if let EntryKind::File { executable: ref mut e } = self.kind {
            *e = executable;
        }
        self
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Number of path components (`a` is 1, `a/b` is 2).
    pub fn depth(&self) -> usize {
        path_depth(&self.path)
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Number of components of a relative path.
pub fn path_depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// Check whether `path` lies strictly beneath directory `dir`.
pub fn is_within(path: &str, dir: &str) -> bool {
    dir.is_empty()
        || (path.len() > dir.len()
            && path.starts_with(dir)
            && path.as_bytes()[dir.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_hex().starts_with("abab"));
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("abc"), None);
    }

    #[test]
    fn test_entry_depth_and_name() {
        let entry = Entry::file("a/b/c.txt", 3, SystemTime::UNIX_EPOCH);
        assert_eq!(entry.depth(), 3);
        assert_eq!(entry.name(), "c.txt");
        assert_eq!(path_depth(""), 0);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("a/b", "a"));
        assert!(is_within("a", ""));
        assert!(!is_within("ab", "a"));
        assert!(!is_within("a", "a"));
    }

    #[test]
    fn test_same_type() {
        let file = EntryKind::File { executable: true };
        assert!(file.same_type(&EntryKind::File { executable: false }));
        assert!(!file.same_type(&EntryKind::Directory));
    }
}
