//! Core types for lsync.
//!
//! This crate provides the data model shared by the scanner, planner,
//! executor and reporting crates: entries, scan results, sync plans,
//! execution reports, configuration and errors.

mod config;
mod entry;
mod error;
mod plan;
mod report;
mod scan;

pub use config::{
    Destination, LSYNC_IGNORE_FILE, STATE_DIR_NAME, SyncConfig, SyncConfigBuilder,
    SyncConfigBuilderError, VCS_DIR_NAMES,
};
pub use entry::{ContentHash, Entry, EntryKind, is_within, path_depth};
pub use error::SyncError;
pub use plan::{ActionCounts, ActionKind, PlanStats, SkipReason, SyncAction, SyncPlan};
pub use report::{ActionFailure, ExecutionReport, LogRecord};
pub use scan::{ScanIssue, ScanResult};
