use std::fs;
use std::path::Path;
use std::sync::Arc;

use lsync_core::EntryKind;
use lsync_scan::{IgnoreFile, IgnoreRuleSet, LocalScanner, ScanOptions, ScanResult};
use tempfile::TempDir;

fn discover(root: &Path, options: &ScanOptions) -> IgnoreRuleSet {
    IgnoreRuleSet::new()
        .discover(
            root,
            &[".lsyncignore".to_string(), ".gitignore".to_string()],
            options,
        )
        .unwrap()
}

fn scan(root: &Path, options: ScanOptions) -> ScanResult {
    let rules = discover(root, &options);
    LocalScanner::new(root, Arc::new(rules), options)
        .scan()
        .unwrap()
}

fn project_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::create_dir_all(root.join(".git/objects")).unwrap();
    fs::create_dir_all(root.join(".lsync/logs")).unwrap();
    fs::write(root.join("a.txt"), "0123456789").unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("src/nested/mod.rs"), "").unwrap();
    fs::write(root.join("sub/data.tmp"), "tmp").unwrap();
    fs::write(root.join("sub/keep.txt"), "keep").unwrap();
    fs::write(root.join("top.tmp"), "tmp").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    fs::write(root.join(".lsync/lock"), "{}").unwrap();
    temp
}

#[test]
fn test_scan_is_deterministic() {
    let temp = project_tree();
    let first = scan(temp.path(), ScanOptions::default());
    let second = scan(temp.path(), ScanOptions::default());
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_nested_ignore_file_is_scoped() {
    let temp = project_tree();
    fs::write(temp.path().join("sub/.lsyncignore"), "*.tmp\n").unwrap();

    let result = scan(temp.path(), ScanOptions::default());
    assert!(!result.contains("sub/data.tmp"));
    assert!(result.contains("sub/keep.txt"));
    assert!(result.contains("top.tmp"));
    // The ignore file itself is synchronized.
    assert!(result.contains("sub/.lsyncignore"));
}

#[test]
fn test_gitignore_is_honored() {
    let temp = project_tree();
    fs::write(temp.path().join(".gitignore"), "src/nested/\n").unwrap();

    let result = scan(temp.path(), ScanOptions::default());
    assert!(!result.contains("src/nested"));
    assert!(!result.contains("src/nested/mod.rs"));
    assert!(result.contains("src/main.rs"));
}

#[test]
fn test_root_ignore_file_applies_everywhere() {
    let temp = project_tree();
    let extra = TempDir::new().unwrap();
    let file = extra.path().join("rules");
    fs::write(&file, "# temporaries\n*.tmp\n").unwrap();

    let options = ScanOptions::default();
    let rules = IgnoreRuleSet::load(&[IgnoreFile::required(&file)]).unwrap();
    let result = LocalScanner::new(temp.path(), Arc::new(rules), options)
        .scan()
        .unwrap();

    assert!(!result.contains("top.tmp"));
    assert!(!result.contains("sub/data.tmp"));
}

#[test]
fn test_vcs_and_state_dirs_are_excluded() {
    let temp = project_tree();

    let result = scan(temp.path(), ScanOptions::default());
    assert!(!result.contains(".git"));
    assert!(!result.contains(".git/HEAD"));
    assert!(!result.contains(".lsync"));
    assert!(!result.contains(".lsync/lock"));

    let with_vcs = scan(
        temp.path(),
        ScanOptions {
            include_vcs: true,
            ..ScanOptions::default()
        },
    );
    assert!(with_vcs.contains(".git/HEAD"));
    assert!(!with_vcs.contains(".lsync"));
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_recorded_not_followed() {
    let temp = project_tree();
    std::os::unix::fs::symlink("src", temp.path().join("link")).unwrap();
    std::os::unix::fs::symlink(".", temp.path().join("src/loop")).unwrap();

    let result = scan(temp.path(), ScanOptions::default());
    let link = result.get("link").unwrap();
    assert_eq!(
        link.kind,
        EntryKind::Symlink {
            target: "src".into()
        }
    );
    assert!(!result.contains("link/main.rs"));
    assert!(result.get("src/loop").unwrap().kind.is_symlink());
}

#[cfg(unix)]
#[test]
fn test_executable_bit_recorded() {
    use std::os::unix::fs::PermissionsExt;

    let temp = project_tree();
    let script = temp.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let result = scan(temp.path(), ScanOptions::default());
    assert_eq!(
        result.get("run.sh").unwrap().kind,
        EntryKind::File { executable: true }
    );
    assert_eq!(
        result.get("a.txt").unwrap().kind,
        EntryKind::File { executable: false }
    );
}

#[test]
fn test_checksum_scan_fingerprints_files_only() {
    let temp = project_tree();
    let result = scan(
        temp.path(),
        ScanOptions {
            checksum: true,
            ..ScanOptions::default()
        },
    );

    for entry in &result {
        assert_eq!(entry.fingerprint.is_some(), entry.is_file(), "{}", entry.path);
    }
}
