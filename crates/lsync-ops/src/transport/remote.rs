//! Transport for a destination on another host, driven over ssh.
//!
//! Every operation is one `ssh host <script>` invocation running a short
//! POSIX shell script. Scanning relies on GNU `find -printf`; content
//! fingerprints rely on `b3sum` being installed on the remote host.

use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use lsync_core::{ContentHash, Entry, EntryKind, STATE_DIR_NAME, ScanIssue, ScanResult};
use lsync_scan::{IgnoreRuleSet, ScanOptions};

use super::{TransferError, Transport};

/// Exit status scripts use for "missing" or "already exists".
const ABSENT_STATUS: i32 = 75;

/// Exit status ssh itself uses for connection failures.
const SSH_FAILURE_STATUS: i32 = 255;

/// Status of `xargs` when some invocation failed but others succeeded.
const XARGS_PARTIAL_STATUS: i32 = 123;

/// Status of `find` when some directories could not be read.
const FIND_PARTIAL_STATUS: i32 = 1;

/// Fields per entry in the scan output.
const SCAN_FIELDS: usize = 6;

/// Exit status and captured output of a remote script.
struct Reply {
    code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

enum Input {
    Null,
    Bytes(Vec<u8>),
    File(tokio::fs::File),
}

/// Destination directory on a host reached over ssh.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    host: String,
    root: String,
    ssh_args: Vec<String>,
    timeout: Duration,
}

impl RemoteTransport {
    /// Create a transport for `host:root`.
    pub fn new(host: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            root: root.into(),
            ssh_args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Extra arguments placed before the host on the ssh command line.
    pub fn with_ssh_args(mut self, ssh_args: Vec<String>) -> Self {
        self.ssh_args = ssh_args;
        self
    }

    /// Timeout applied to each remote operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-ready path of `rel` under the root.
    fn path(&self, rel: &str) -> String {
        remote_path(&join(&self.root, rel))
    }

    /// Shell-ready path of a state file.
    fn state(&self, name: &str) -> String {
        self.path(&join(STATE_DIR_NAME, name))
    }

    fn command(&self, script: &str, stdin: bool) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .args(&self.ssh_args)
            .arg(&self.host)
            .arg(script)
            .stdin(if stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep ssh out of the terminal's process group so Ctrl-C reaches
        // only lsync, which then finishes the in-flight action.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Run `script` remotely and classify its exit status.
    ///
    /// Returns the reply for success and for any status in `accept`.
    async fn run(
        &self,
        op: &'static str,
        script: &str,
        input: Input,
        accept: &[i32],
        timeout: Duration,
    ) -> Result<Reply, TransferError> {
        debug!(host = %self.host, op, "remote command");
        let mut child = self
            .command(script, !matches!(input, Input::Null))
            .spawn()
            .map_err(|e| TransferError::transport(format!("failed to start ssh: {e}")))?;

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match input {
                Input::Null => {}
                Input::Bytes(bytes) => stdin.write_all(&bytes).await?,
                Input::File(mut file) => {
                    tokio::io::copy(&mut file, &mut stdin).await?;
                }
            }
            stdin.shutdown().await
        };

        let (fed, output) =
            tokio::time::timeout(timeout, async { tokio::join!(feed, child.wait_with_output()) })
                .await
                .map_err(|_| TransferError::Timeout(timeout))?;
        let output = output.map_err(|e| TransferError::transport(format!("ssh failed: {e}")))?;

        let code = exit_code(&self.host, &output)?;
        // A script may exit before reading its input; only a clean exit
        // makes a broken feed an error of its own.
        match fed {
            Err(err) if code == 0 => return Err(TransferError::io(op, err)),
            _ => {}
        }
        if code == 0 || accept.contains(&code) {
            Ok(Reply {
                code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        } else {
            Err(TransferError::Remote {
                op,
                status: code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn run_simple(&self, op: &'static str, script: &str) -> Result<(), TransferError> {
        self.run(op, script, Input::Null, &[], self.timeout)
            .await
            .map(|_| ())
    }

    /// Attach `b3sum` fingerprints to the files of `result`.
    async fn fingerprint(&self, result: &mut ScanResult) -> Result<(), TransferError> {
        let mut list = Vec::new();
        for entry in result.iter().filter(|e| e.is_file()) {
            list.extend_from_slice(entry.path.as_bytes());
            list.push(0);
        }
        if list.is_empty() {
            return Ok(());
        }

        let script = format!("cd {} && xargs -0 -r b3sum --", self.path(""));
        let reply = self
            .run(
                "checksum",
                &script,
                Input::Bytes(list),
                &[XARGS_PARTIAL_STATUS],
                self.timeout,
            )
            .await?;
        if reply.code == XARGS_PARTIAL_STATUS {
            warn!(host = %self.host, "some remote files could not be fingerprinted");
        }

        for (path, hash) in parse_b3sum_output(&String::from_utf8_lossy(&reply.stdout)) {
            if let Some(entry) = result.get_mut(path) {
                entry.fingerprint = Some(hash);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.root)
    }

    async fn probe(&self) -> Result<(), TransferError> {
        let root = self.path("");
        let script = format!(
            "[ ! -e {root} ] || [ -d {root} ] || {{ echo 'destination is not a directory' >&2; exit 1; }}"
        );
        self.run_simple("probe", &script).await
    }

    async fn scan(
        &self,
        rules: Arc<IgnoreRuleSet>,
        options: ScanOptions,
    ) -> Result<ScanResult, TransferError> {
        let script = scan_script(&self.path(""), &options);
        let reply = self
            .run(
                "scan",
                &script,
                Input::Null,
                &[FIND_PARTIAL_STATUS],
                self.timeout,
            )
            .await?;

        let mut result = parse_find_output(&reply.stdout, &rules, &options).map_err(|message| {
            TransferError::Remote {
                op: "scan",
                status: reply.code,
                stderr: message,
            }
        })?;
        if reply.code == FIND_PARTIAL_STATUS {
            let issues = parse_find_errors(&String::from_utf8_lossy(&reply.stderr));
            warn!(host = %self.host, issues = issues.len(), "remote scan was incomplete");
            for issue in issues {
                result.push_issue(issue);
            }
        }
        if options.checksum {
            self.fingerprint(&mut result).await?;
        }
        debug!(host = %self.host, entries = result.len(), "remote scan complete");
        Ok(result)
    }

    async fn create_dir(&self, rel: &str) -> Result<(), TransferError> {
        let path = self.path(rel);
        let script = format!(
            "if [ -L {path} ] || {{ [ -e {path} ] && [ ! -d {path} ]; }}; then rm -f -- {path}; fi; mkdir -p -- {path}"
        );
        self.run_simple("mkdir", &script).await
    }

    async fn put_file(&self, local_src: &Path, entry: &Entry) -> Result<u64, TransferError> {
        let file = tokio::fs::File::open(local_src)
            .await
            .map_err(|e| TransferError::io(&entry.path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| TransferError::io(&entry.path, e))?
            .len();

        let executable = matches!(entry.kind, EntryKind::File { executable: true });
        let script = upload_script(
            &self.path(parent(&entry.path)),
            &self.path(&entry.path),
            &self.path(&temp_name(&entry.path)),
            size,
            entry.modified,
            executable,
        );

        // Larger uploads get roughly one extra second per MiB.
        let timeout = self.timeout + Duration::from_secs(size >> 20);
        self.run("upload", &script, Input::File(file), &[], timeout)
            .await?;
        Ok(size)
    }

    async fn put_symlink(&self, rel: &str, target: &str) -> Result<(), TransferError> {
        let path = self.path(rel);
        let tmp = self.path(&temp_name(rel));
        let script = format!(
            "mkdir -p -- {parent} && rm -f -- {tmp} && ln -s -- {target} {tmp} && \
             if [ -d {path} ] && [ ! -L {path} ]; then rm -rf -- {path}; fi && mv -fT -- {tmp} {path}",
            parent = self.path(parent(rel)),
            target = shell_quote(target),
        );
        self.run_simple("symlink", &script).await
    }

    async fn remove(&self, rel: &str, is_dir: bool) -> Result<(), TransferError> {
        let path = self.path(rel);
        let script = if is_dir {
            format!("if [ -d {path} ] && [ ! -L {path} ]; then rmdir -- {path}; fi")
        } else {
            format!("rm -f -- {path}")
        };
        self.run_simple("remove", &script).await
    }

    async fn write_state(&self, name: &str, bytes: &[u8]) -> Result<(), TransferError> {
        let file = self.state(name);
        let script = format!(
            "mkdir -p -- {dir} && cat > {tmp} && mv -f -- {tmp} {file}",
            dir = self.state(parent(name)),
            tmp = self.state(&temp_name(name)),
        );
        self.run(
            "write state",
            &script,
            Input::Bytes(bytes.to_vec()),
            &[],
            self.timeout,
        )
        .await
        .map(|_| ())
    }

    async fn read_state(&self, name: &str) -> Result<Option<Vec<u8>>, TransferError> {
        let file = self.state(name);
        let script = format!("[ -f {file} ] || exit {ABSENT_STATUS}; cat -- {file}");
        let reply = self
            .run(
                "read state",
                &script,
                Input::Null,
                &[ABSENT_STATUS],
                self.timeout,
            )
            .await?;
        Ok((reply.code == 0).then_some(reply.stdout))
    }

    async fn list_state(&self, subdir: &str) -> Result<Vec<String>, TransferError> {
        let script = format!(
            "cd {} 2>/dev/null || exit 0; for f in *; do [ -f \"$f\" ] && printf '%s\\0' \"$f\"; done; true",
            self.state(subdir)
        );
        let reply = self
            .run("list state", &script, Input::Null, &[], self.timeout)
            .await?;
        let mut names: Vec<String> = reply
            .stdout
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .filter_map(|name| String::from_utf8(name.to_vec()).ok())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn create_state_exclusive(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<bool, TransferError> {
        let file = self.state(name);
        let script = format!(
            "mkdir -p -- {dir} || exit 1; [ ! -e {file} ] || exit {ABSENT_STATUS}; (set -C; cat > {file}) 2>/dev/null || {{ [ -e {file} ] && exit {ABSENT_STATUS}; exit 1; }}",
            dir = self.state(parent(name)),
        );
        let reply = self
            .run(
                "create state",
                &script,
                Input::Bytes(bytes.to_vec()),
                &[ABSENT_STATUS],
                self.timeout,
            )
            .await?;
        Ok(reply.code == 0)
    }

    async fn remove_state(&self, name: &str) -> Result<(), TransferError> {
        let script = format!("rm -f -- {}", self.state(name));
        self.run_simple("remove state", &script).await
    }
}

/// Map ssh's exit status, treating its own failures as transport errors.
fn exit_code(host: &str, output: &Output) -> Result<i32, TransferError> {
    match output.status.code() {
        Some(SSH_FAILURE_STATUS) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("ssh to {host} failed"),
                msg => format!("ssh to {host} failed: {msg}"),
            };
            Err(TransferError::transport(message))
        }
        Some(code) => Ok(code),
        None => Err(TransferError::transport(format!(
            "ssh to {host} was terminated by a signal"
        ))),
    }
}

fn scan_script(root: &str, options: &ScanOptions) -> String {
    let mut prune = format!("-path ./{STATE_DIR_NAME}");
    if !options.include_vcs {
        for name in lsync_core::VCS_DIR_NAMES {
            prune.push_str(&format!(" -o -name {name}"));
        }
    }
    format!(
        "cd {root} 2>/dev/null || exit 0; LC_ALL=C find . -mindepth 1 \\( {prune} \\) -prune -o -printf '%y\\0%s\\0%T@\\0%m\\0%P\\0%l\\0'"
    )
}

fn upload_script(
    parent: &str,
    dest: &str,
    tmp: &str,
    size: u64,
    modified: SystemTime,
    executable: bool,
) -> String {
    let stamp = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let mode = if executable { "a+x" } else { "a-x" };
    format!(
        "set -e; trap 'rm -f -- {tmp_q}' EXIT; mkdir -p -- {parent}; \
         cat > {tmp}; \
         [ \"$(wc -c < {tmp})\" -eq {size} ] || {{ echo 'short upload' >&2; exit 1; }}; \
         touch -m -d @{secs}.{nanos:09} -- {tmp}; chmod {mode} -- {tmp}; \
         if [ -d {dest} ] && [ ! -L {dest} ]; then rm -rf -- {dest}; fi; \
         mv -fT -- {tmp} {dest}",
        tmp_q = tmp.replace('\'', "'\\''"),
        secs = stamp.as_secs(),
        nanos = stamp.subsec_nanos(),
    )
}

/// Turn `find` diagnostics such as `find: './x': Permission denied` into
/// scan issues keyed by root-relative path.
fn parse_find_errors(stderr: &str) -> Vec<ScanIssue> {
    stderr
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let Some((quoted, reason)) = line
                .strip_prefix("find: ")
                .and_then(|rest| rest.rsplit_once(": "))
            else {
                return Some(ScanIssue::new("", line));
            };
            let path = quoted.trim_matches(|c| matches!(c, '\'' | '`' | '\u{2018}' | '\u{2019}'));
            let path = path.strip_prefix("./").unwrap_or(path);
            Some(ScanIssue::new(path, reason))
        })
        .collect()
}

/// Parse NUL-separated `find -printf` records into a scan result.
fn parse_find_output(
    bytes: &[u8],
    rules: &IgnoreRuleSet,
    options: &ScanOptions,
) -> Result<ScanResult, String> {
    let mut fields: Vec<&[u8]> = bytes.split(|&b| b == 0).collect();
    // Output ends with a separator, leaving one empty trailing field.
    if fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    if fields.len() % SCAN_FIELDS != 0 {
        return Err(format!(
            "malformed scan output ({} fields)",
            fields.len()
        ));
    }

    let mut result = ScanResult::new();
    for record in fields.chunks(SCAN_FIELDS) {
        let &[kind, size, mtime, mode, path, link] = record else {
            continue;
        };
        let Ok(path) = std::str::from_utf8(path) else {
            result.push_issue(ScanIssue::new(
                String::from_utf8_lossy(path),
                "file name is not valid UTF-8",
            ));
            continue;
        };
        let is_dir = kind == b"d";
        if options.is_reserved(path) || rules.matches(path, is_dir) {
            continue;
        }

        let text = |field: &[u8]| std::str::from_utf8(field).unwrap_or_default().to_string();
        let modified = parse_mtime(&text(mtime)).unwrap_or(SystemTime::UNIX_EPOCH);

        let entry = match kind {
            b"d" => Entry::directory(path, modified),
            b"f" => {
                let size = text(size).parse().unwrap_or(0);
                let executable = u32::from_str_radix(&text(mode), 8)
                    .map(|m| m & 0o111 != 0)
                    .unwrap_or(false);
                Entry::file(path, size, modified).with_executable(executable)
            }
            b"l" => match std::str::from_utf8(link) {
                Ok(target) => Entry::symlink(path, target, modified),
                Err(_) => {
                    result.push_issue(ScanIssue::new(path, "symlink target is not valid UTF-8"));
                    continue;
                }
            },
            _ => continue,
        };
        result.insert(entry);
    }
    Ok(result)
}

/// Parse `find`'s `%T@` (seconds with a fractional part).
fn parse_mtime(text: &str) -> Option<SystemTime> {
    let (secs, frac) = text.split_once('.').unwrap_or((text, ""));
    let secs: i64 = secs.parse().ok()?;
    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos: u32 = digits.parse().ok()?;

    if secs >= 0 {
        SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
    } else {
        SystemTime::UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))?
            .checked_add(Duration::from_nanos(u64::from(nanos)))
    }
}

/// Parse `b3sum` lines (`<hex>  <path>`). Escaped names are skipped.
fn parse_b3sum_output(text: &str) -> Vec<(&str, ContentHash)> {
    text.lines()
        .filter(|line| !line.starts_with('\\'))
        .filter_map(|line| {
            let (hex, path) = line.split_once("  ")?;
            Some((path, ContentHash::from_hex(hex)?))
        })
        .collect()
}

/// Quote a string for safe shell usage.
fn shell_quote(s: &str) -> String {
    let mut result = String::from("'");
    for ch in s.chars() {
        if ch == '\'' {
            result.push_str("'\\''");
        } else {
            result.push(ch);
        }
    }
    result.push('\'');
    result
}

/// Quote a remote path, letting a leading `~` expand to the home directory.
fn remote_path(path: &str) -> String {
    if path == "~" {
        "\"$HOME\"".to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("\"$HOME\"/{}", shell_quote(rest))
    } else {
        shell_quote(path)
    }
}

fn join(base: &str, rel: &str) -> String {
    if rel.is_empty() {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

fn parent(rel: &str) -> &str {
    rel.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

fn temp_name(rel: &str) -> String {
    match rel.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/.{name}.lsync-tmp"),
        None => format!(".{rel}.lsync-tmp"),
    }
}
