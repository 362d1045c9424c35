//! Transport for a destination on the local file system.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use lsync_core::{Entry, EntryKind, STATE_DIR_NAME, ScanResult, SyncError};
use lsync_scan::{IgnoreRuleSet, LocalScanner, ScanOptions};

use super::{TransferError, Transport};

/// Destination directory on this machine.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Create a transport rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.root.join(STATE_DIR_NAME).join(name)
    }

    /// Run blocking file system work on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, TransferError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(root))
            .await
            .map_err(|e| TransferError::transport(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn probe(&self) -> Result<(), TransferError> {
        self.blocking(|root| match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(TransferError::transport(format!(
                "{} is not a directory",
                root.display()
            ))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TransferError::io(root.display().to_string(), err)),
        })
        .await
    }

    async fn scan(
        &self,
        rules: Arc<IgnoreRuleSet>,
        options: ScanOptions,
    ) -> Result<ScanResult, TransferError> {
        self.blocking(move |root| {
            if !root.exists() {
                debug!(root = %root.display(), "destination does not exist yet");
                return Ok(ScanResult::new());
            }
            LocalScanner::new(&root, rules, options)
                .scan()
                .map_err(|err| match err {
                    SyncError::Io { path, source } => {
                        TransferError::io(path.display().to_string(), source)
                    }
                    other => TransferError::transport(other.to_string()),
                })
        })
        .await
    }

    async fn create_dir(&self, rel: &str) -> Result<(), TransferError> {
        let rel = rel.to_string();
        self.blocking(move |root| {
            let path = root.join(&rel);
            match fs::symlink_metadata(&path) {
                Ok(meta) if !meta.is_dir() => {
                    fs::remove_file(&path).map_err(|e| TransferError::io(&rel, e))?;
                }
                _ => {}
            }
            fs::create_dir_all(&path).map_err(|e| TransferError::io(&rel, e))
        })
        .await
    }

    async fn put_file(&self, local_src: &Path, entry: &Entry) -> Result<u64, TransferError> {
        let src = local_src.to_path_buf();
        let entry = entry.clone();
        self.blocking(move |root| {
            let dest = root.join(&entry.path);
            write_file(&src, &dest, &entry).map_err(|e| TransferError::io(&entry.path, e))
        })
        .await
    }

    async fn put_symlink(&self, rel: &str, target: &str) -> Result<(), TransferError> {
        let rel = rel.to_string();
        let target = target.to_string();
        self.blocking(move |root| {
            let path = root.join(&rel);
            write_symlink(&target, &path).map_err(|e| TransferError::io(&rel, e))
        })
        .await
    }

    async fn remove(&self, rel: &str, is_dir: bool) -> Result<(), TransferError> {
        let rel = rel.to_string();
        self.blocking(move |root| {
            let path = root.join(&rel);
            let result = if is_dir {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(TransferError::io(&rel, err)),
                _ => Ok(()),
            }
        })
        .await
    }

    async fn write_state(&self, name: &str, bytes: &[u8]) -> Result<(), TransferError> {
        let path = self.state_path(name);
        let bytes = bytes.to_vec();
        let name = name.to_string();
        self.blocking(move |_| {
            let write = || -> io::Result<()> {
                let parent = path
                    .parent()
                    .ok_or_else(|| io::Error::other("state path has no parent"))?;
                fs::create_dir_all(parent)?;
                let tmp = temp_sibling(&path);
                fs::write(&tmp, &bytes)?;
                fs::rename(&tmp, &path)
            };
            write().map_err(|e| TransferError::io(&name, e))
        })
        .await
    }

    async fn read_state(&self, name: &str) -> Result<Option<Vec<u8>>, TransferError> {
        let path = self.state_path(name);
        let name = name.to_string();
        self.blocking(move |_| match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TransferError::io(&name, err)),
        })
        .await
    }

    async fn list_state(&self, subdir: &str) -> Result<Vec<String>, TransferError> {
        let dir = self.state_path(subdir);
        let subdir = subdir.to_string();
        self.blocking(move |_| {
            let read_dir = match fs::read_dir(&dir) {
                Ok(read_dir) => read_dir,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(TransferError::io(&subdir, err)),
            };
            let mut names: Vec<String> = read_dir
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter_map(|e| e.file_name().into_string().ok())
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn create_state_exclusive(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<bool, TransferError> {
        let path = self.state_path(name);
        let bytes = bytes.to_vec();
        let name = name.to_string();
        self.blocking(move |_| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| TransferError::io(&name, e))?;
            }
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&bytes)
                        .and_then(|_| file.sync_all())
                        .map_err(|e| TransferError::io(&name, e))?;
                    Ok(true)
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(err) => Err(TransferError::io(&name, err)),
            }
        })
        .await
    }

    async fn remove_state(&self, name: &str) -> Result<(), TransferError> {
        let path = self.state_path(name);
        let name = name.to_string();
        self.blocking(move |_| match fs::remove_file(&path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(TransferError::io(&name, err)),
            _ => Ok(()),
        })
        .await
    }
}

/// Copy `src` over `dest` through a temporary sibling, preserving mtime.
///
/// Whatever occupies `dest` is only cleared once the new content is
/// complete, so a failed copy leaves the destination untouched.
fn write_file(src: &Path, dest: &Path, entry: &Entry) -> io::Result<u64> {
    create_parent(dest)?;
    let tmp = temp_sibling(dest);

    let result = (|| -> io::Result<u64> {
        let bytes = fs::copy(src, &tmp)?;
        let file = File::options().write(true).open(&tmp)?;
        file.set_modified(entry.modified)?;
        set_executable(&file, matches!(entry.kind, EntryKind::File { executable: true }))?;
        drop(file);
        clear_dir_slot(dest)?;
        fs::rename(&tmp, dest)?;
        Ok(bytes)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Create a symlink at `path` through a temporary sibling.
fn write_symlink(target: &str, path: &Path) -> io::Result<()> {
    create_parent(path)?;
    let tmp = temp_sibling(path);
    let _ = fs::remove_file(&tmp);

    let result = make_symlink(target, &tmp)
        .and_then(|_| clear_dir_slot(path))
        .and_then(|_| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Remove a directory occupying `path`; `rename` replaces anything else.
///
/// The planner only replaces a directory when deletion is allowed.
fn clear_dir_slot(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        _ => Ok(()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lsync-tmp"))
}

#[cfg(unix)]
fn set_executable(file: &File, executable: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = file.metadata()?.permissions();
    let mode = perms.mode();
    let mode = if executable {
        mode | ((mode & 0o444) >> 2)
    } else {
        mode & !0o111
    };
    perms.set_mode(mode);
    file.set_permissions(perms)
}

#[cfg(not(unix))]
fn set_executable(_file: &File, _executable: bool) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, _path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
