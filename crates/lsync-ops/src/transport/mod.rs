//! Destination transports.
//!
//! The executor, lease and journal only talk to a [`Transport`], so the rest
//! of the pipeline does not care whether the destination is a local directory
//! or a directory on a host reached over ssh.

mod local;
mod remote;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use lsync_core::{Destination, Entry, ScanResult};
use lsync_scan::{IgnoreRuleSet, ScanOptions};

pub use local::LocalTransport;
pub use remote::RemoteTransport;

/// Failure of a single transport operation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Local or remote file system error for one path.
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The transport itself is unusable (host unreachable, auth failure).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The operation did not finish in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A remote command exited with an error.
    #[error("remote {op} failed (exit status {status}): {stderr}")]
    Remote {
        op: &'static str,
        status: i32,
        stderr: String,
    },
}

impl TransferError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Check whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            Self::Timeout(_) => true,
            Self::Transport { .. } | Self::Remote { .. } => false,
        }
    }

    /// Check whether the transport can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Operations the executor needs from a destination.
///
/// Paths are relative to the destination root and `/`-separated. State
/// names are relative to the state directory (`.lsync`) at that root.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable destination, used in logs and errors.
    fn describe(&self) -> String;

    /// Check that the destination is reachable.
    async fn probe(&self) -> Result<(), TransferError>;

    /// Scan the destination tree. A missing root scans as empty.
    async fn scan(
        &self,
        rules: Arc<IgnoreRuleSet>,
        options: ScanOptions,
    ) -> Result<ScanResult, TransferError>;

    /// Create a directory (and missing parents), replacing a non-directory.
    async fn create_dir(&self, rel: &str) -> Result<(), TransferError>;

    /// Upload `local_src` to `entry.path`, returning the bytes written.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// an interrupted upload never leaves a truncated file behind.
    async fn put_file(&self, local_src: &Path, entry: &Entry) -> Result<u64, TransferError>;

    /// Create or replace a symbolic link.
    async fn put_symlink(&self, rel: &str, target: &str) -> Result<(), TransferError>;

    /// Remove an entry. Directories must be empty. Missing entries are fine.
    async fn remove(&self, rel: &str, is_dir: bool) -> Result<(), TransferError>;

    /// Atomically write a state file.
    async fn write_state(&self, name: &str, bytes: &[u8]) -> Result<(), TransferError>;

    /// Read a state file, or `None` if it does not exist.
    async fn read_state(&self, name: &str) -> Result<Option<Vec<u8>>, TransferError>;

    /// Names of the files in a state subdirectory, sorted.
    async fn list_state(&self, subdir: &str) -> Result<Vec<String>, TransferError>;

    /// Create a state file only if absent. Returns `false` if it existed.
    async fn create_state_exclusive(&self, name: &str, bytes: &[u8])
    -> Result<bool, TransferError>;

    /// Remove a state file. Missing files are fine.
    async fn remove_state(&self, name: &str) -> Result<(), TransferError>;
}

/// Open the transport for a destination.
pub fn connect(
    destination: &Destination,
    ssh_args: &[String],
    timeout: Duration,
) -> Arc<dyn Transport> {
    match destination {
        Destination::Local(path) => Arc::new(LocalTransport::new(path)),
        Destination::Remote { host, path } => Arc::new(
            RemoteTransport::new(host, path)
                .with_ssh_args(ssh_args.to_vec())
                .with_timeout(timeout),
        ),
    }
}
