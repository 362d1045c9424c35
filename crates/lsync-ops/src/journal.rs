//! Per-destination store of past sync records.
//!
//! Each executed run writes one JSON file under `.lsync/logs/` through the
//! destination transport, so records of a remote destination can be read
//! back later from any machine with `lsync log host:path`.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use lsync_core::LogRecord;

use crate::transport::{TransferError, Transport};

/// State subdirectory holding records.
pub const LOG_DIR: &str = "logs";

/// Append-only record store of one destination.
pub struct Journal {
    transport: Arc<dyn Transport>,
}

impl Journal {
    /// Create a journal backed by `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Store a record, returning its file name.
    pub async fn append(&self, record: &LogRecord) -> Result<String, TransferError> {
        let name = record_name(record, std::process::id());
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| TransferError::io(&name, std::io::Error::other(e)))?;
        self.transport
            .write_state(&format!("{LOG_DIR}/{name}"), &bytes)
            .await?;
        Ok(name)
    }

    /// The newest `limit` records, oldest first.
    ///
    /// Records that cannot be parsed are skipped.
    pub async fn read(&self, limit: usize) -> Result<Vec<LogRecord>, TransferError> {
        let names: Vec<String> = self
            .transport
            .list_state(LOG_DIR)
            .await?
            .into_iter()
            .filter(|name| name.ends_with(".json"))
            .collect();
        let skip = names.len().saturating_sub(limit);

        let mut records = Vec::new();
        for name in &names[skip..] {
            let Some(bytes) = self.transport.read_state(&format!("{LOG_DIR}/{name}")).await? else {
                continue;
            };
            match serde_json::from_slice(&bytes) {
                Ok(record) => records.push(record),
                Err(err) => warn!(record = %name, "skipping unreadable log record: {err}"),
            }
        }
        Ok(records)
    }

    /// The most recent record.
    pub async fn last(&self) -> Result<Option<LogRecord>, TransferError> {
        Ok(self.read(1).await?.pop())
    }
}

/// File name sorting chronologically: `<YYYYmmddTHHMMSS.mmm>-<pid>.json`.
///
/// Stamped in UTC so names keep sorting across offset changes.
fn record_name(record: &LogRecord, pid: u32) -> String {
    format!(
        "{}-{pid}.json",
        record
            .started_at
            .with_timezone(&Utc)
            .format("%Y%m%dT%H%M%S%.3f")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use lsync_core::ExecutionReport;

    #[test]
    fn test_record_name() {
        let started = Utc
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .unwrap()
            .with_timezone(&Local);
        let record = LogRecord::from_report(started, "s", "d", false, false, &ExecutionReport::default());
        assert_eq!(record_name(&record, 42), "20260304T050607.000-42.json");
    }

    #[test]
    fn test_record_names_follow_instants() {
        let earlier = Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap();
        let later = earlier + chrono::Duration::minutes(45);
        let name = |at: chrono::DateTime<Utc>| {
            let record = LogRecord::from_report(
                at.with_timezone(&Local),
                "s",
                "d",
                false,
                false,
                &ExecutionReport::default(),
            );
            record_name(&record, 1)
        };
        assert!(name(earlier) < name(later));
    }
}
