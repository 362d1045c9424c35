//! Execution outcomes and persisted log records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::plan::{ActionCounts, ActionKind};

/// An action that failed permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// Relative path of the action.
    pub path: String,
    /// What was being attempted.
    pub action: ActionKind,
    /// A human-readable error message.
    pub message: String,
}

impl ActionFailure {
    /// Create a new action failure.
    pub fn new(path: impl Into<String>, action: ActionKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path, self.message)
    }
}

/// Result of applying a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Actions applied successfully, including skips that were honored.
    pub completed: ActionCounts,
    /// Actions that failed after retries.
    pub failures: Vec<ActionFailure>,
    /// Actions never attempted (transport lost or run interrupted).
    pub halted: usize,
    /// Bytes of file content written.
    pub bytes_transferred: u64,
    /// The run stopped early because of a cancellation request.
    pub interrupted: bool,
    /// Wall-clock execution time.
    pub elapsed: Duration,
}

impl ExecutionReport {
    /// Check if every action succeeded and nothing was halted.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.halted == 0 && !self.interrupted
    }

    /// Number of failed actions.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// One persisted record per executed invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub source: String,
    pub destination: String,
    pub delete: bool,
    #[serde(default)]
    pub checksum: bool,
    pub completed: ActionCounts,
    pub failed: usize,
    #[serde(default)]
    pub halted: usize,
    pub bytes_transferred: u64,
    #[serde(default)]
    pub failures: Vec<ActionFailure>,
    #[serde(default)]
    pub interrupted: bool,
}

impl LogRecord {
    /// Build a record from an execution report.
    pub fn from_report(
        started_at: DateTime<Local>,
        source: impl Into<String>,
        destination: impl Into<String>,
        delete: bool,
        checksum: bool,
        report: &ExecutionReport,
    ) -> Self {
        Self {
            started_at,
            finished_at: Local::now(),
            source: source.into(),
            destination: destination.into(),
            delete,
            checksum,
            completed: report.completed,
            failed: report.failed(),
            halted: report.halted,
            bytes_transferred: report.bytes_transferred,
            failures: report.failures.clone(),
            interrupted: report.interrupted,
        }
    }
}
