//! Plan execution engine for lsync.
//!
//! This crate applies a [`SyncPlan`](lsync_core::SyncPlan) to a destination
//! through a [`Transport`], either a local directory or a directory on a
//! remote host reached over ssh. It also owns the destination-side state:
//! the lease that keeps two syncs from writing the same destination and the
//! journal of past runs.
//!
//! [`SyncSession`] ties the pieces together for one invocation.

mod executor;
mod journal;
mod lease;
mod session;
mod transport;

pub use executor::{Executor, RetryPolicy};
pub use journal::{Journal, LOG_DIR};
pub use lease::{LOCK_FILE, Lease, LeaseHolder};
pub use session::{SessionOutcome, SyncSession, load_rules};
pub use transport::{LocalTransport, RemoteTransport, TransferError, Transport, connect};
