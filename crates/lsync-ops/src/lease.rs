//! Destination lease preventing concurrent syncs.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lsync_core::SyncError;

use crate::transport::Transport;

/// State file holding the lease.
pub const LOCK_FILE: &str = "lock";

/// Who holds a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseHolder {
    pub pid: u32,
    pub user: String,
    pub source: String,
    pub acquired_at: DateTime<Local>,
}

impl LeaseHolder {
    /// Describe the current process as a holder.
    pub fn current(source: impl Into<String>) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            pid: std::process::id(),
            user,
            source: source.into(),
            acquired_at: Local::now(),
        }
    }
}

impl fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid {} of {} syncing {} since {}",
            self.pid,
            self.user,
            self.source,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// An acquired lease. Call [`Lease::release`] on every exit path.
pub struct Lease {
    transport: Arc<dyn Transport>,
    released: bool,
}

impl Lease {
    /// Take the lease for the transport's destination.
    pub async fn acquire(
        transport: Arc<dyn Transport>,
        source: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let holder = LeaseHolder::current(source);
        let bytes = serde_json::to_vec(&holder)
            .map_err(|e| SyncError::config(format!("cannot encode lease: {e}")))?;

        let created = transport
            .create_state_exclusive(LOCK_FILE, &bytes)
            .await
            .map_err(|e| SyncError::transport(transport.describe(), e.to_string()))?;

        if !created {
            let holder = match Self::holder(transport.as_ref()).await {
                Ok(Some(holder)) => holder.to_string(),
                _ => "unknown holder".to_string(),
            };
            return Err(SyncError::LockHeld {
                destination: transport.describe(),
                holder,
            });
        }

        debug!(destination = %transport.describe(), "lease acquired");
        Ok(Self {
            transport,
            released: false,
        })
    }

    /// Give the lease back.
    pub async fn release(mut self) -> Result<(), SyncError> {
        self.released = true;
        self.transport
            .remove_state(LOCK_FILE)
            .await
            .map_err(|e| SyncError::transport(self.transport.describe(), e.to_string()))?;
        debug!(destination = %self.transport.describe(), "lease released");
        Ok(())
    }

    /// Read the current holder, if any.
    pub async fn holder(transport: &dyn Transport) -> Result<Option<LeaseHolder>, SyncError> {
        let bytes = transport
            .read_state(LOCK_FILE)
            .await
            .map_err(|e| SyncError::transport(transport.describe(), e.to_string()))?;
        Ok(bytes.and_then(|b| serde_json::from_slice(&b).ok()))
    }

    /// Remove a lease left behind by a crashed run.
    ///
    /// Returns the previous holder when one was recorded.
    pub async fn break_lease(transport: &dyn Transport) -> Result<Option<LeaseHolder>, SyncError> {
        let holder = Self::holder(transport).await?;
        transport
            .remove_state(LOCK_FILE)
            .await
            .map_err(|e| SyncError::transport(transport.describe(), e.to_string()))?;
        Ok(holder)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                destination = %self.transport.describe(),
                "lease dropped without release; run `lsync unlock` if it is stale"
            );
        }
    }
}
