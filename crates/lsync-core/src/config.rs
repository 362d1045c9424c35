//! Sync configuration types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Name of the per-destination state directory (lease and log records).
pub const STATE_DIR_NAME: &str = ".lsync";

/// Per-directory ignore file understood by lsync itself.
pub const LSYNC_IGNORE_FILE: &str = ".lsyncignore";

/// Version-control metadata directories excluded unless requested.
pub const VCS_DIR_NAMES: &[&str] = &[".git", ".hg", ".svn"];

/// Where the synchronized tree is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// A directory on this machine.
    Local(PathBuf),
    /// A directory on a host reachable over ssh.
    Remote { host: String, path: String },
}

impl Destination {
    /// Parse `path` or `host:path`.
    ///
    /// A colon counts as a host separator only when no `/` precedes it, so
    /// `./a:b` stays local.
    pub fn parse(arg: &str) -> Result<Self, SyncError> {
        if arg.is_empty() {
            return Err(SyncError::config("destination cannot be empty"));
        }

        match arg.find(':') {
            Some(idx) if !arg[..idx].contains('/') => {
                let host = &arg[..idx];
                if host.is_empty() {
                    return Err(SyncError::config(format!("missing host in '{arg}'")));
                }
                if host.starts_with('-') {
                    return Err(SyncError::config(format!("invalid host '{host}'")));
                }
                let path = match &arg[idx + 1..] {
                    "" => ".",
                    p => p,
                };
                Ok(Self::Remote {
                    host: host.to_string(),
                    path: path.to_string(),
                })
            }
            _ => Ok(Self::Local(PathBuf::from(arg))),
        }
    }

    /// Check if the destination is on another host.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote { host, path } => write!(f, "{host}:{path}"),
        }
    }
}

/// Resolved configuration for one sync invocation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    /// Local source root.
    pub source: PathBuf,

    /// Destination root.
    pub destination: Destination,

    /// Plan and report only.
    #[builder(default = "false")]
    #[serde(default)]
    pub dry_run: bool,

    /// Delete destination entries absent from the source.
    #[builder(default = "false")]
    #[serde(default)]
    pub delete: bool,

    /// Root-scoped ignore files that must exist.
    #[builder(default)]
    #[serde(default)]
    pub ignore_files: Vec<PathBuf>,

    /// Root-scoped ignore file loaded only if present.
    #[builder(default)]
    #[serde(default)]
    pub global_ignore: Option<PathBuf>,

    /// File names read as per-directory ignore files.
    #[builder(default = "default_ignore_filenames()")]
    #[serde(default = "default_ignore_filenames")]
    pub ignore_filenames: Vec<String>,

    /// Compare content fingerprints instead of size and mtime.
    #[builder(default = "false")]
    #[serde(default)]
    pub checksum: bool,

    /// Keep `.git`, `.hg` and `.svn` directories in the sync.
    #[builder(default = "false")]
    #[serde(default)]
    pub include_vcs: bool,

    /// Tolerated modification time difference.
    #[builder(default)]
    #[serde(default)]
    pub modify_window: Duration,

    /// Retries per action on transient failures.
    #[builder(default = "1")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timeout for each remote operation.
    #[builder(default = "Duration::from_secs(30)")]
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout: Duration,

    /// Extra arguments passed to ssh.
    #[builder(default)]
    #[serde(default)]
    pub ssh_args: Vec<String>,
}

fn default_ignore_filenames() -> Vec<String> {
    vec![LSYNC_IGNORE_FILE.to_string(), ".gitignore".to_string()]
}

fn default_max_retries() -> u32 {
    1
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.source {
            Some(ref source) if source.as_os_str().is_empty() => {
                return Err("Source path cannot be empty".to_string());
            }
            None => return Err("Source path is required".to_string()),
            _ => {}
        }
        match self.destination {
            Some(Destination::Local(ref path)) if path.as_os_str().is_empty() => {
                Err("Destination path cannot be empty".to_string())
            }
            Some(Destination::Remote { ref host, .. }) if host.is_empty() => {
                Err("Destination host cannot be empty".to_string())
            }
            None => Err("Destination is required".to_string()),
            _ => Ok(()),
        }
    }
}

impl SyncConfig {
    /// Create a new sync config builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Create a config with defaults for a source/destination pair.
    pub fn new(source: impl Into<PathBuf>, destination: Destination) -> Self {
        Self {
            source: source.into(),
            destination,
            dry_run: false,
            delete: false,
            ignore_files: Vec::new(),
            global_ignore: None,
            ignore_filenames: default_ignore_filenames(),
            checksum: false,
            include_vcs: false,
            modify_window: Duration::ZERO,
            max_retries: default_max_retries(),
            remote_timeout: default_remote_timeout(),
            ssh_args: Vec::new(),
        }
    }
}
