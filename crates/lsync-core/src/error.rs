//! Error types for sync runs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a sync run.
///
/// Per-entry problems are not errors: they are recorded as
/// [`ScanIssue`](crate::ScanIssue)s or [`ActionFailure`](crate::ActionFailure)s.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid arguments, configuration, or ignore files.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote host unreachable or rejected the connection.
    #[error("Transport error ({target}): {message}")]
    Transport { target: String, message: String },

    /// Another sync holds the destination lease.
    #[error("Another sync is in progress for {destination} (held by {holder})")]
    LockHeld { destination: String, holder: String },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Operation was interrupted.
    #[error("Operation interrupted")]
    Interrupted,
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}
