//! Sync actions and plans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Why an action was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Destination entry absent from source, but deletion is disabled.
    DeleteDisabled,
    /// Source needs a non-directory where the destination has a directory.
    ReplaceDisabled,
    /// The source entry could not be read during the scan.
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteDisabled => write!(f, "would-delete-but-delete-disabled"),
            Self::ReplaceDisabled => write!(f, "would-replace-directory-but-delete-disabled"),
            Self::Unreadable(reason) => write!(f, "{reason}"),
        }
    }
}

/// One step of a sync plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    /// Create an entry absent from the destination.
    Copy(Entry),
    /// Overwrite a stale destination entry.
    Update(Entry),
    /// Remove a destination entry absent from the source.
    Delete(Entry),
    /// Leave a path untouched.
    Skip { path: String, reason: SkipReason },
}

impl SyncAction {
    /// Relative path the action applies to.
    pub fn path(&self) -> &str {
        match self {
            Self::Copy(entry) | Self::Update(entry) | Self::Delete(entry) => &entry.path,
            Self::Skip { path, .. } => path,
        }
    }

    /// Kind of action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Copy(_) => ActionKind::Copy,
            Self::Update(_) => ActionKind::Update,
            Self::Delete(_) => ActionKind::Delete,
            Self::Skip { .. } => ActionKind::Skip,
        }
    }

    /// Bytes this action would transfer.
    pub fn transfer_bytes(&self) -> u64 {
        match self {
            Self::Copy(entry) | Self::Update(entry) if entry.is_file() => entry.size,
            _ => 0,
        }
    }

    /// Check if the action changes the destination.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Skip { .. })
    }
}

/// Discriminant of [`SyncAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Copy,
    Update,
    Delete,
    Skip,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Counts per action kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub copies: usize,
    pub updates: usize,
    pub deletes: usize,
    pub skips: usize,
}

impl ActionCounts {
    /// Count one action of the given kind.
    pub fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Copy => self.copies += 1,
            ActionKind::Update => self.updates += 1,
            ActionKind::Delete => self.deletes += 1,
            ActionKind::Skip => self.skips += 1,
        }
    }

    /// Copies, updates and deletes together.
    pub fn mutations(&self) -> usize {
        self.copies + self.updates + self.deletes
    }

    /// All actions including skips.
    pub fn total(&self) -> usize {
        self.mutations() + self.skips
    }
}

/// Aggregate statistics of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    /// Actions per kind.
    pub counts: ActionCounts,
    /// Bytes of file content to transfer.
    pub bytes_to_transfer: u64,
}

/// Ordered, immutable sequence of actions with statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    actions: Vec<SyncAction>,
    stats: PlanStats,
}

impl SyncPlan {
    /// Build a plan from actions already in execution order.
    pub fn new(actions: Vec<SyncAction>) -> Self {
        let mut stats = PlanStats::default();
        for action in &actions {
            stats.counts.record(action.kind());
            stats.bytes_to_transfer += action.transfer_bytes();
        }
        Self { actions, stats }
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    /// Check if nothing would change at the destination.
    pub fn is_empty(&self) -> bool {
        self.stats.counts.mutations() == 0
    }

    /// Number of actions including skips.
    pub fn len(&self) -> usize {
        self.actions.len()
    }
}
