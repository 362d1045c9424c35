//! Summaries of plans, execution reports and sync records.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use lsync_core::{
    ActionCounts, ActionFailure, ExecutionReport, LogRecord, SyncAction, SyncPlan,
};

/// Whether a summary describes projected or actual work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    /// Computed from a plan that was not executed.
    Planned,
    /// Computed from an execution.
    Executed,
}

/// Counts, byte totals and failures of one sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub kind: SummaryKind,
    pub counts: ActionCounts,
    /// Projected bytes for plans, transferred bytes for executions.
    pub bytes: u64,
    pub failed: usize,
    pub halted: usize,
    pub interrupted: bool,
    pub failures: Vec<ActionFailure>,
    /// Wall-clock execution time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

impl Summary {
    /// Check whether every attempted action succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.halted == 0 && !self.interrupted
    }
}

/// Anything that can be summarized for the user.
pub trait Summarize {
    fn summarize(&self) -> Summary;
}

impl Summarize for SyncPlan {
    fn summarize(&self) -> Summary {
        let stats = self.stats();
        Summary {
            kind: SummaryKind::Planned,
            counts: stats.counts,
            bytes: stats.bytes_to_transfer,
            failed: 0,
            halted: 0,
            interrupted: false,
            failures: Vec::new(),
            elapsed_secs: None,
        }
    }
}

impl Summarize for ExecutionReport {
    fn summarize(&self) -> Summary {
        Summary {
            kind: SummaryKind::Executed,
            counts: self.completed,
            bytes: self.bytes_transferred,
            failed: self.failed(),
            halted: self.halted,
            interrupted: self.interrupted,
            failures: self.failures.clone(),
            elapsed_secs: Some(self.elapsed.as_secs_f64()),
        }
    }
}

impl Summarize for LogRecord {
    fn summarize(&self) -> Summary {
        let elapsed = (self.finished_at - self.started_at).num_milliseconds().max(0);
        Summary {
            kind: SummaryKind::Executed,
            counts: self.completed,
            bytes: self.bytes_transferred,
            failed: self.failed,
            halted: self.halted,
            interrupted: self.interrupted,
            failures: self.failures.clone(),
            elapsed_secs: Some(elapsed as f64 / 1000.0),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            SummaryKind::Planned => "Dry run",
            SummaryKind::Executed => "Synced",
        };
        write!(f, "{label}: {}", format_counts(&self.counts))?;
        if let Some(secs) = self.elapsed_secs {
            write!(f, " in {secs:.2}s")?;
        }
        writeln!(f)?;

        match self.kind {
            SummaryKind::Planned => writeln!(f, "Would transfer {}", format_size(self.bytes))?,
            SummaryKind::Executed => writeln!(f, "Transferred {}", format_size(self.bytes))?,
        }

        if self.failed > 0 || self.halted > 0 {
            writeln!(f, "{} failed, {} not attempted", self.failed, self.halted)?;
        }
        for failure in &self.failures {
            writeln!(f, "  ! {failure}")?;
        }
        if self.interrupted {
            writeln!(f, "Interrupted before completion")?;
        }
        Ok(())
    }
}

/// List every planned action, one per line.
///
/// `+` copy, `~` update, `-` delete, `!` skip. Directories carry a
/// trailing `/`.
pub fn render_plan(plan: &SyncPlan) -> String {
    let mut out = String::new();
    for action in plan.actions() {
        let _ = match action {
            SyncAction::Copy(entry) => writeln!(out, "+ {}{}", entry.path, dir_suffix(entry.is_dir())),
            SyncAction::Update(entry) => {
                writeln!(out, "~ {}{}", entry.path, dir_suffix(entry.is_dir()))
            }
            SyncAction::Delete(entry) => {
                writeln!(out, "- {}{}", entry.path, dir_suffix(entry.is_dir()))
            }
            SyncAction::Skip { path, reason } => writeln!(out, "! {path} ({reason})"),
        };
    }
    out
}

/// One line describing a past sync.
pub fn render_record(record: &LogRecord) -> String {
    let mut line = format!(
        "{}  {} -> {}  {} copied, {} updated, {} deleted",
        record.started_at.format("%Y-%m-%d %H:%M:%S"),
        record.source,
        record.destination,
        record.completed.copies,
        record.completed.updates,
        record.completed.deletes,
    );
    if record.failed > 0 {
        let _ = write!(line, ", {} failed", record.failed);
    }
    let _ = write!(line, ", {}", format_size(record.bytes_transferred));
    if record.interrupted {
        line.push_str(" (interrupted)");
    }
    line
}

/// Format size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

fn format_counts(counts: &ActionCounts) -> String {
    format!(
        "{}, {}, {}, {}",
        plural(counts.copies, "copy", "copies"),
        plural(counts.updates, "update", "updates"),
        plural(counts.deletes, "delete", "deletes"),
        plural(counts.skips, "skip", "skips"),
    )
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn dir_suffix(is_dir: bool) -> &'static str {
    if is_dir { "/" } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0, "copy", "copies"), "0 copies");
        assert_eq!(plural(1, "copy", "copies"), "1 copy");
        assert_eq!(plural(2, "skip", "skips"), "2 skips");
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(30), "30 B");
    }

    #[test]
    fn test_summary_success() {
        let mut summary = ExecutionReport::default().summarize();
        assert!(summary.is_success());
        summary.halted = 1;
        assert!(!summary.is_success());
    }
}
