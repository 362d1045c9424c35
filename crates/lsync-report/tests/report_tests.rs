use std::time::{Duration, SystemTime};

use chrono::{Local, TimeZone};

use lsync_core::{
    ActionFailure, ActionKind, Entry, ExecutionReport, LogRecord, SkipReason, SyncAction,
    SyncPlan,
};
use lsync_report::{Summarize, SummaryKind, render_plan, render_record};

fn sample_plan() -> SyncPlan {
    let t = SystemTime::UNIX_EPOCH;
    SyncPlan::new(vec![
        SyncAction::Copy(Entry::file("a.txt", 10, t)),
        SyncAction::Copy(Entry::directory("b", t)),
        SyncAction::Copy(Entry::file("b/b1.txt", 20, t)),
        SyncAction::Update(Entry::file("c.txt", 5, t)),
        SyncAction::Skip {
            path: "locked".into(),
            reason: SkipReason::Unreadable("permission denied".into()),
        },
        SyncAction::Delete(Entry::directory("old", t)),
    ])
}

#[test]
fn test_plan_summary_is_projected() {
    let summary = sample_plan().summarize();
    assert_eq!(summary.kind, SummaryKind::Planned);
    assert_eq!(summary.counts.copies, 3);
    assert_eq!(summary.counts.updates, 1);
    assert_eq!(summary.counts.deletes, 1);
    assert_eq!(summary.counts.skips, 1);
    assert_eq!(summary.bytes, 35);
    assert!(summary.elapsed_secs.is_none());

    let text = summary.to_string();
    assert!(text.starts_with("Dry run: 3 copies, 1 update, 1 delete, 1 skip\n"));
    assert!(text.contains("Would transfer 35 B"));
}

#[test]
fn test_render_plan_markers() {
    let listing = render_plan(&sample_plan());
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(
        lines,
        vec![
            "+ a.txt",
            "+ b/",
            "+ b/b1.txt",
            "~ c.txt",
            "! locked (permission denied)",
            "- old/",
        ]
    );
}

#[test]
fn test_execution_summary_lists_failures() {
    let mut report = ExecutionReport::default();
    report.completed.record(ActionKind::Copy);
    report.completed.record(ActionKind::Copy);
    report.bytes_transferred = 30;
    report.halted = 2;
    report.interrupted = true;
    report.elapsed = Duration::from_millis(1500);
    report
        .failures
        .push(ActionFailure::new("a.txt", ActionKind::Copy, "No such file"));

    let summary = report.summarize();
    assert_eq!(summary.kind, SummaryKind::Executed);
    assert!(!summary.is_success());

    let text = summary.to_string();
    assert!(text.starts_with("Synced: 2 copies, 0 updates, 0 deletes, 0 skips in 1.50s\n"));
    assert!(text.contains("Transferred 30 B"));
    assert!(text.contains("1 failed, 2 not attempted"));
    assert!(text.contains("  ! copy a.txt: No such file"));
    assert!(text.contains("Interrupted before completion"));
}

#[test]
fn test_summary_serializes_kind_lowercase() {
    let json = serde_json::to_value(sample_plan().summarize()).unwrap();
    assert_eq!(json["kind"], "planned");
    assert_eq!(json["bytes"], 35);
    assert!(json.get("elapsed_secs").is_none());
}

#[test]
fn test_render_record() {
    let started = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
    let mut report = ExecutionReport::default();
    report.completed.record(ActionKind::Copy);
    report.completed.record(ActionKind::Delete);
    report.bytes_transferred = 12;
    report
        .failures
        .push(ActionFailure::new("x", ActionKind::Update, "denied"));

    let record = LogRecord::from_report(started, "/src", "host:/dst", true, false, &report);
    assert_eq!(
        render_record(&record),
        "2026-03-04 05:06:07  /src -> host:/dst  1 copied, 0 updated, 1 deleted, 1 failed, 12 B"
    );

    let summary = record.summarize();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.counts.deletes, 1);
}
