//! Plan executor with per-action retries and cancellation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lsync_core::{
    ActionFailure, ActionKind, EntryKind, ExecutionReport, SyncAction, SyncPlan,
};

use crate::transport::{TransferError, Transport};

/// Retry bound for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default backoff.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Applies a [`SyncPlan`] to a destination transport.
pub struct Executor {
    transport: Arc<dyn Transport>,
    source_root: PathBuf,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Executor {
    /// Create an executor copying from `source_root`.
    pub fn new(transport: Arc<dyn Transport>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            source_root: source_root.into(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop between actions once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply every action in plan order.
    ///
    /// A failed action is recorded and execution continues. A transport
    /// failure or a cancellation halts the remaining actions; the in-flight
    /// action is always allowed to finish.
    pub async fn execute(&self, plan: &SyncPlan) -> ExecutionReport {
        let start = Instant::now();
        let mut report = ExecutionReport::default();
        let mut actions = plan.actions().iter();

        while let Some(action) = actions.next() {
            if !action.is_mutation() {
                report.completed.record(ActionKind::Skip);
                continue;
            }
            if self.cancel.is_cancelled() {
                info!("sync interrupted, halting remaining actions");
                report.interrupted = true;
                halt(&mut report, std::iter::once(action).chain(actions));
                break;
            }

            match self.apply_with_retry(action).await {
                Ok(bytes) => {
                    debug!(action = %action.kind(), path = action.path(), "done");
                    report.completed.record(action.kind());
                    report.bytes_transferred += bytes;
                }
                Err(err) => {
                    warn!(action = %action.kind(), path = action.path(), "failed: {err}");
                    let fatal = err.is_fatal();
                    report.failures.push(ActionFailure::new(
                        action.path(),
                        action.kind(),
                        err.to_string(),
                    ));
                    if fatal {
                        warn!(
                            destination = %self.transport.describe(),
                            "transport lost, halting remaining actions"
                        );
                        halt(&mut report, actions);
                        break;
                    }
                }
            }
        }

        report.elapsed = start.elapsed();
        report
    }

    async fn apply_with_retry(&self, action: &SyncAction) -> Result<u64, TransferError> {
        let mut attempt = 0;
        loop {
            match self.apply(action).await {
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        path = action.path(),
                        attempt, "transient failure, retrying: {err}"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(err),
                        _ = tokio::time::sleep(self.retry.backoff) => {}
                    }
                }
                result => return result,
            }
        }
    }

    async fn apply(&self, action: &SyncAction) -> Result<u64, TransferError> {
        match action {
            SyncAction::Copy(entry) | SyncAction::Update(entry) => match &entry.kind {
                EntryKind::Directory => self.transport.create_dir(&entry.path).await.map(|_| 0),
                EntryKind::File { .. } => {
                    let src = self.source_root.join(&entry.path);
                    self.transport.put_file(&src, entry).await
                }
                EntryKind::Symlink { target } => self
                    .transport
                    .put_symlink(&entry.path, target)
                    .await
                    .map(|_| 0),
            },
            SyncAction::Delete(entry) => self
                .transport
                .remove(&entry.path, entry.is_dir())
                .await
                .map(|_| 0),
            SyncAction::Skip { .. } => Ok(0),
        }
    }
}

/// Count actions that will not be attempted.
fn halt<'a>(report: &mut ExecutionReport, rest: impl Iterator<Item = &'a SyncAction>) {
    for action in rest {
        if action.is_mutation() {
            report.halted += 1;
        } else {
            report.completed.record(ActionKind::Skip);
        }
    }
}
