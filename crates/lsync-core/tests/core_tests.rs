use lsync_core::{
    ActionKind, ContentHash, Destination, Entry, EntryKind, ScanIssue, ScanResult, SkipReason,
    SyncAction, SyncConfig, SyncPlan,
};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

#[test]
fn test_content_hash_roundtrip_and_inequality() {
    let hash = ContentHash::new([0xab; 32]);
    let hex = hash.to_hex();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(ContentHash::from_hex(&hex), Some(hash));
    assert_ne!(hash, ContentHash::new([0xcd; 32]));
}

#[test]
fn test_entry_kind_discrimination() {
    let file = Entry::file("a.txt", 10, SystemTime::UNIX_EPOCH).with_executable(true);
    assert!(file.is_file());
    assert_eq!(file.kind, EntryKind::File { executable: true });

    let dir = Entry::directory("b", SystemTime::UNIX_EPOCH);
    assert!(dir.is_dir());
    assert_eq!(dir.size, 0);

    let link = Entry::symlink("c", "../target", SystemTime::UNIX_EPOCH);
    assert!(link.kind.is_symlink());
    assert_eq!(link.kind.label(), "symlink");
}

#[test]
fn test_scan_result_issues_are_kept_separately() {
    let mut result = ScanResult::new();
    result.insert(Entry::file("ok.txt", 1, SystemTime::UNIX_EPOCH));
    result.push_issue(ScanIssue::new("bad.txt", "read error: denied"));

    assert_eq!(result.len(), 1);
    assert!(!result.contains("bad.txt"));
    assert_eq!(result.issues().len(), 1);
}

#[test]
fn test_plan_preserves_action_order() {
    let actions = vec![
        SyncAction::Copy(Entry::directory("b", SystemTime::UNIX_EPOCH)),
        SyncAction::Copy(Entry::file("b/b1.txt", 20, SystemTime::UNIX_EPOCH)),
        SyncAction::Delete(Entry::file("z", 5, SystemTime::UNIX_EPOCH)),
        SyncAction::Skip {
            path: "y".into(),
            reason: SkipReason::Unreadable("read error".into()),
        },
    ];
    let plan = SyncPlan::new(actions.clone());

    assert_eq!(plan.actions(), actions.as_slice());
    let kinds: Vec<_> = plan.actions().iter().map(|a| a.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::Copy,
            ActionKind::Copy,
            ActionKind::Delete,
            ActionKind::Skip
        ]
    );
    // Deleted bytes are not transferred.
    assert_eq!(plan.stats().bytes_to_transfer, 20);
}

#[test]
fn test_sync_config_builder() {
    let config = SyncConfig::builder()
        .source("/home/user/work")
        .destination(Destination::parse("gpu1:/data").unwrap())
        .delete(true)
        .dry_run(true)
        .max_retries(3u32)
        .modify_window(Duration::from_secs(1))
        .build()
        .unwrap();

    assert_eq!(config.source, PathBuf::from("/home/user/work"));
    assert!(config.destination.is_remote());
    assert!(config.delete);
    assert!(config.dry_run);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.remote_timeout, Duration::from_secs(30));
    assert_eq!(config.ignore_filenames, vec![".lsyncignore", ".gitignore"]);
}

#[test]
fn test_sync_config_builder_rejects_empty_source() {
    let result = SyncConfig::builder()
        .source("")
        .destination(Destination::Local(PathBuf::from("/out")))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_sync_config_simple() {
    let config = SyncConfig::new("/src", Destination::Local(PathBuf::from("/dst")));
    assert!(!config.dry_run);
    assert!(!config.delete);
    assert_eq!(config.max_retries, 1);
    assert!(config.ignore_files.is_empty());
}
