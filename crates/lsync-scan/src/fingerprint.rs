//! BLAKE3 content fingerprints.

use std::io;
use std::path::Path;

use rayon::prelude::*;
use tracing::warn;

use lsync_core::{ContentHash, ScanIssue, ScanResult};

/// Hash a single file, memory-mapping large files.
pub fn fingerprint_file(path: &Path) -> io::Result<ContentHash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap_rayon(path)?;
    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Fingerprint every regular file of `result` in parallel.
///
/// Files that cannot be hashed are dropped from the result and recorded as
/// issues, so they are never compared with a missing fingerprint.
pub fn fingerprint_entries(root: &Path, result: &mut ScanResult) {
    let files: Vec<String> = result
        .iter()
        .filter(|e| e.is_file())
        .map(|e| e.path.clone())
        .collect();

    let hashed: Vec<(String, io::Result<ContentHash>)> = files
        .into_par_iter()
        .map(|rel| {
            let hash = fingerprint_file(&root.join(&rel));
            (rel, hash)
        })
        .collect();

    for (rel, hash) in hashed {
        match hash {
            Ok(hash) => {
                if let Some(entry) = result.get_mut(&rel) {
                    entry.fingerprint = Some(hash);
                }
            }
            Err(err) => {
                warn!(path = %rel, "failed to fingerprint: {err}");
                result.remove(&rel);
                result.push_issue(ScanIssue::read_error(rel, &err));
            }
        }
    }
}
