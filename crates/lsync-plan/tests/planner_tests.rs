use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use lsync_core::{
    ActionKind, Destination, Entry, ScanIssue, ScanResult, SkipReason, SyncAction, SyncConfig,
};
use lsync_plan::plan;

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn config(delete: bool) -> SyncConfig {
    let mut config = SyncConfig::new("/src", Destination::Local(PathBuf::from("/dst")));
    config.delete = delete;
    config
}

fn scan(entries: &[Entry]) -> ScanResult {
    entries.iter().cloned().collect()
}

fn summary(actions: &[SyncAction]) -> Vec<(ActionKind, &str)> {
    actions.iter().map(|a| (a.kind(), a.path())).collect()
}

#[test]
fn test_copy_into_empty_destination() {
    let source = scan(&[
        Entry::file("a.txt", 10, at(1)),
        Entry::directory("b", at(1)),
        Entry::file("b/b1.txt", 20, at(1)),
    ]);

    let plan = plan(&source, &ScanResult::new(), &config(false));

    assert_eq!(
        summary(plan.actions()),
        vec![
            (ActionKind::Copy, "a.txt"),
            (ActionKind::Copy, "b"),
            (ActionKind::Copy, "b/b1.txt"),
        ]
    );
    assert_eq!(plan.stats().bytes_to_transfer, 30);
    assert_eq!(plan.stats().counts.copies, 3);
}

#[test]
fn test_directory_precedes_contents() {
    let source = scan(&[
        Entry::directory("a", at(1)),
        Entry::file("a-b", 1, at(1)),
        Entry::file("a/x", 1, at(1)),
        Entry::directory("a/y", at(1)),
        Entry::file("a/y/z", 1, at(1)),
    ]);

    let plan = plan(&source, &ScanResult::new(), &config(false));
    let paths: Vec<_> = plan.actions().iter().map(|a| a.path()).collect();

    for (i, path) in paths.iter().enumerate() {
        if let Some((parent, _)) = path.rsplit_once('/') {
            let parent_idx = paths.iter().position(|p| *p == parent).unwrap();
            assert!(parent_idx < i, "{parent} must precede {path}");
        }
    }
}

#[test]
fn test_deletions_deepest_first() {
    let destination = scan(&[
        Entry::directory("a", at(1)),
        Entry::directory("a/b", at(1)),
        Entry::file("a/b/c.txt", 3, at(1)),
        Entry::file("z.txt", 1, at(1)),
    ]);

    let plan = plan(&ScanResult::new(), &destination, &config(true));

    assert_eq!(
        summary(plan.actions()),
        vec![
            (ActionKind::Delete, "a/b/c.txt"),
            (ActionKind::Delete, "a/b"),
            (ActionKind::Delete, "z.txt"),
            (ActionKind::Delete, "a"),
        ]
    );
    assert_eq!(plan.stats().bytes_to_transfer, 0);
}

#[test]
fn test_deletions_follow_copies() {
    let source = scan(&[Entry::file("new.txt", 5, at(1))]);
    let destination = scan(&[Entry::file("old.txt", 5, at(1))]);

    let plan = plan(&source, &destination, &config(true));
    assert_eq!(
        summary(plan.actions()),
        vec![(ActionKind::Copy, "new.txt"), (ActionKind::Delete, "old.txt")]
    );
}

#[test]
fn test_delete_disabled_becomes_skip() {
    let destination = scan(&[Entry::file("extra.txt", 5, at(1))]);

    let plan = plan(&ScanResult::new(), &destination, &config(false));

    assert_eq!(
        plan.actions(),
        &[SyncAction::Skip {
            path: "extra.txt".into(),
            reason: SkipReason::DeleteDisabled,
        }]
    );
    assert!(plan.is_empty());
}

#[test]
fn test_unchanged_tree_plans_nothing() {
    let entries = [
        Entry::directory("d", at(5)),
        Entry::file("d/f", 4, at(5)),
        Entry::symlink("l", "d/f", at(5)),
    ];
    let plan = plan(&scan(&entries), &scan(&entries), &config(true));
    assert!(plan.is_empty());
    assert_eq!(plan.len(), 0);
}

#[test]
fn test_stale_file_is_updated() {
    let source = scan(&[Entry::file("f", 4, at(10))]);
    let destination = scan(&[Entry::file("f", 4, at(5))]);

    let plan = plan(&source, &destination, &config(false));
    assert_eq!(summary(plan.actions()), vec![(ActionKind::Update, "f")]);
    assert_eq!(plan.stats().bytes_to_transfer, 4);
}

#[test]
fn test_modify_window_tolerates_skew() {
    let source = scan(&[Entry::file("f", 4, at(10))]);
    let destination = scan(&[Entry::file("f", 4, at(11))]);

    let mut cfg = config(false);
    assert!(!plan(&source, &destination, &cfg).is_empty());

    cfg.modify_window = Duration::from_secs(1);
    assert!(plan(&source, &destination, &cfg).is_empty());
}

#[test]
fn test_file_replacing_directory_requires_delete() {
    let source = scan(&[Entry::file("x", 1, at(1))]);
    let destination = scan(&[
        Entry::directory("x", at(1)),
        Entry::file("x/inner", 1, at(1)),
    ]);

    let plan_without = plan(&source, &destination, &config(false));
    assert_eq!(
        plan_without.actions()[0],
        SyncAction::Skip {
            path: "x".into(),
            reason: SkipReason::ReplaceDisabled,
        }
    );
    assert!(plan_without.is_empty());

    let plan_with = plan(&source, &destination, &config(true));
    assert_eq!(summary(plan_with.actions()), vec![(ActionKind::Update, "x")]);
}

#[test]
fn test_directory_replacing_file() {
    let source = scan(&[Entry::directory("x", at(1)), Entry::file("x/a", 1, at(1))]);
    let destination = scan(&[Entry::file("x", 1, at(1))]);

    let plan = plan(&source, &destination, &config(false));
    assert_eq!(
        summary(plan.actions()),
        vec![(ActionKind::Update, "x"), (ActionKind::Copy, "x/a")]
    );
}

#[test]
fn test_unreadable_source_entry_is_skipped_not_deleted() {
    let mut source = scan(&[Entry::file("ok.txt", 1, at(1))]);
    source.push_issue(ScanIssue::new("locked", "read error: permission denied"));
    let destination = scan(&[
        Entry::file("ok.txt", 1, at(1)),
        Entry::directory("locked", at(1)),
        Entry::file("locked/data", 1, at(1)),
    ]);

    let plan = plan(&source, &destination, &config(true));
    assert_eq!(
        plan.actions(),
        &[SyncAction::Skip {
            path: "locked".into(),
            reason: SkipReason::Unreadable("read error: permission denied".into()),
        }]
    );
}

#[test]
fn test_planning_is_deterministic() {
    let source = scan(&[
        Entry::file("c", 1, at(1)),
        Entry::file("a", 1, at(1)),
        Entry::directory("b", at(1)),
    ]);
    let destination = scan(&[Entry::file("d/e", 1, at(1)), Entry::directory("d", at(1))]);

    let first = plan(&source, &destination, &config(true));
    let second = plan(&source, &destination, &config(true));
    assert_eq!(first, second);
}
