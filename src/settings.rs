//! User settings stored in `$LSYNC_DIR`.
//!
//! `lsync.toml` supplies defaults and named server groups; `.lsyncignore`
//! next to it is a global ignore file applied to every sync.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lsync_core::{Destination, LSYNC_IGNORE_FILE, SyncError};

/// Settings file name inside the settings directory.
pub const SETTINGS_FILE: &str = "lsync.toml";

/// Contents of `lsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub defaults: Defaults,
    pub servers: BTreeMap<String, Server>,
}

/// Defaults applied when the command line does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Per-action retry bound.
    pub retries: u32,
    /// Per remote operation timeout in seconds.
    pub timeout_secs: u64,
    /// Extra ssh arguments for every remote destination.
    pub ssh_args: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retries: 1,
            timeout_secs: 30,
            ssh_args: Vec::new(),
        }
    }
}

/// A named group of hosts sharing a base directory (`@name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub hosts: Vec<String>,
    pub base_dir: String,
    #[serde(default)]
    pub ssh_args: Vec<String>,
}

/// One resolved destination and the ssh arguments it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub destination: Destination,
    pub ssh_args: Vec<String>,
}

/// The settings directory: `$LSYNC_DIR`, else `<config dir>/lsync`.
pub fn settings_dir() -> PathBuf {
    match std::env::var_os("LSYNC_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lsync"),
    }
}

/// Path of the global ignore file in `dir`.
pub fn global_ignore(dir: &Path) -> PathBuf {
    dir.join(LSYNC_IGNORE_FILE)
}

impl Settings {
    /// Load `lsync.toml` from `dir`. A missing file yields defaults.
    pub fn load(dir: &Path) -> Result<Self, SyncError> {
        let path = dir.join(SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| SyncError::config(format!("{}: {e}", path.display()))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(SyncError::io(path, err)),
        }
    }

    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve a destination argument to one or more targets.
    ///
    /// `@name` expands to every host of server `name`, each at
    /// `<base_dir>/<source directory name>`.
    pub fn resolve(&self, arg: &str, source: &Path) -> Result<Vec<Target>, SyncError> {
        let Some(name) = arg.strip_prefix('@') else {
            let destination = Destination::parse(arg)?;
            let ssh_args = if destination.is_remote() {
                self.defaults.ssh_args.clone()
            } else {
                Vec::new()
            };
            return Ok(vec![Target {
                destination,
                ssh_args,
            }]);
        };

        let server = self
            .servers
            .get(name)
            .ok_or_else(|| SyncError::config(format!("unknown server '@{name}'")))?;
        if server.hosts.is_empty() {
            return Err(SyncError::config(format!("server '@{name}' has no hosts")));
        }
        let dir_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SyncError::config(format!(
                    "cannot derive a directory name from '{}'",
                    source.display()
                ))
            })?;
        let path = format!("{}/{dir_name}", server.base_dir.trim_end_matches('/'));

        let mut ssh_args = self.defaults.ssh_args.clone();
        ssh_args.extend(server.ssh_args.iter().cloned());

        server
            .hosts
            .iter()
            .map(|host| {
                let destination = Destination::parse(&format!("{host}:{path}"))?;
                Ok(Target {
                    destination,
                    ssh_args: ssh_args.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[defaults]
retries = 3
ssh_args = ["-q"]

[servers.gpu]
hosts = ["gpu-a", "gpu-b"]
base_dir = "/home/me/sync/"
ssh_args = ["-p", "2222"]
"#;

    #[test]
    fn test_parse_partial_defaults() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.defaults.retries, 3);
        assert_eq!(settings.defaults.timeout_secs, 30);
        assert_eq!(settings.servers["gpu"].hosts.len(), 2);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(Settings::load(temp.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SETTINGS_FILE), "defaults = 3").unwrap();
        assert!(matches!(
            Settings::load(temp.path()),
            Err(SyncError::Config { .. })
        ));
    }

    #[test]
    fn test_resolve_server_group() {
        let settings = Settings::parse(SAMPLE).unwrap();
        let targets = settings
            .resolve("@gpu", Path::new("/work/project"))
            .unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].destination.to_string(), "gpu-a:/home/me/sync/project");
        assert_eq!(targets[1].destination.to_string(), "gpu-b:/home/me/sync/project");
        assert_eq!(targets[0].ssh_args, vec!["-q", "-p", "2222"]);
    }

    #[test]
    fn test_resolve_plain_destinations() {
        let settings = Settings::parse(SAMPLE).unwrap();

        let local = settings.resolve("/tmp/out", Path::new("/src")).unwrap();
        assert!(!local[0].destination.is_remote());
        assert!(local[0].ssh_args.is_empty());

        let remote = settings.resolve("box:/data", Path::new("/src")).unwrap();
        assert!(remote[0].destination.is_remote());
        assert_eq!(remote[0].ssh_args, vec!["-q"]);
    }

    #[test]
    fn test_resolve_unknown_server() {
        let settings = Settings::default();
        assert!(settings.resolve("@nope", Path::new("/src")).is_err());
    }
}
