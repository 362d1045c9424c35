//! Sync planning for lsync.
//!
//! Compares a source [`ScanResult`](lsync_core::ScanResult) with a
//! destination scan and produces an ordered [`SyncPlan`](lsync_core::SyncPlan).
//! Planning is pure: it never touches the file system, so a dry run is just a
//! plan that is reported instead of executed.

mod planner;

pub use planner::{Planner, plan};
