//! Ignore rules and file system scanning for lsync.
//!
//! This crate turns a directory tree into a [`ScanResult`]:
//!
//! - **Ignore rules** are loaded from ignore files and scoped to the
//!   directory that declares them ([`IgnoreRuleSet`])
//! - **Parallel traversal** via jwalk, pruning excluded directories
//! - **Content fingerprints** with BLAKE3 when checksums are requested
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lsync_scan::{IgnoreFile, IgnoreRuleSet, LocalScanner, ScanOptions};
//!
//! let options = ScanOptions::default();
//! let rules = IgnoreRuleSet::load(&[IgnoreFile::optional("/path/to/.lsyncignore")])
//!     .unwrap()
//!     .discover("/path/to/scan".as_ref(), &[".lsyncignore".into()], &options)
//!     .unwrap();
//!
//! let scanner = LocalScanner::new("/path/to/scan", Arc::new(rules), options);
//! let result = scanner.scan().unwrap();
//! println!("{} entries, {} bytes", result.len(), result.total_size());
//! ```

mod fingerprint;
mod ignore;
mod scanner;

pub use fingerprint::{fingerprint_entries, fingerprint_file};
pub use ignore::{IgnoreFile, IgnoreRuleSet};
pub use scanner::{LocalScanner, ScanOptions};

// Re-export core types for convenience
pub use lsync_core::{Entry, EntryKind, ScanIssue, ScanResult};
