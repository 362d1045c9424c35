//! One sync invocation from rule loading to the journal record.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lsync_core::{ExecutionReport, LogRecord, ScanResult, SyncConfig, SyncError, SyncPlan};
use lsync_scan::{IgnoreFile, IgnoreRuleSet, LocalScanner, ScanOptions};

use crate::executor::{Executor, RetryPolicy};
use crate::journal::Journal;
use crate::lease::Lease;
use crate::transport::{self, Transport};

/// Load root-scoped ignore files, then discover per-directory ones.
///
/// Reads the file system; call from a blocking context.
pub fn load_rules(config: &SyncConfig) -> Result<IgnoreRuleSet, SyncError> {
    let mut files = Vec::new();
    if let Some(global) = &config.global_ignore {
        files.push(IgnoreFile::optional(global));
    }
    files.extend(config.ignore_files.iter().map(IgnoreFile::required));

    IgnoreRuleSet::load(&files)?.discover(
        &config.source,
        &config.ignore_filenames,
        &ScanOptions::from_config(config),
    )
}

/// What a session did.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Dry run: the plan was computed and nothing was written.
    Planned(SyncPlan),
    /// The plan was applied.
    Executed {
        plan: SyncPlan,
        report: ExecutionReport,
    },
}

impl SessionOutcome {
    /// The computed plan.
    pub fn plan(&self) -> &SyncPlan {
        match self {
            Self::Planned(plan) | Self::Executed { plan, .. } => plan,
        }
    }

    /// The execution report, absent for dry runs.
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            Self::Planned(_) => None,
            Self::Executed { report, .. } => Some(report),
        }
    }
}

/// Drives scan, plan and execution for one source/destination pair.
pub struct SyncSession {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

impl SyncSession {
    /// Create a session, connecting to the configured destination.
    pub fn new(config: SyncConfig) -> Self {
        let transport = transport::connect(
            &config.destination,
            &config.ssh_args,
            config.remote_timeout,
        );
        Self::with_transport(config, transport)
    }

    /// Create a session over an explicit transport.
    pub fn with_transport(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between actions once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configuration of this session.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Destination transport.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Scan both sides and compute the plan.
    pub async fn plan(&self) -> Result<SyncPlan, SyncError> {
        let (rules, source) = self.scan_source().await?;
        self.probe().await?;
        self.plan_against(rules, &source).await
    }

    /// Load ignore rules and scan the source off the async runtime.
    async fn scan_source(&self) -> Result<(Arc<IgnoreRuleSet>, ScanResult), SyncError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let rules = Arc::new(load_rules(&config)?);
            let scanner = LocalScanner::new(
                &config.source,
                Arc::clone(&rules),
                ScanOptions::from_config(&config),
            );
            Ok::<_, SyncError>((rules, scanner.scan()?))
        })
        .await
        .map_err(|e| SyncError::config(format!("source scan task failed: {e}")))?
    }

    async fn probe(&self) -> Result<(), SyncError> {
        self.transport
            .probe()
            .await
            .map_err(|e| SyncError::transport(self.transport.describe(), e.to_string()))
    }

    /// Scan the destination and diff it against `source`.
    async fn plan_against(
        &self,
        rules: Arc<IgnoreRuleSet>,
        source: &ScanResult,
    ) -> Result<SyncPlan, SyncError> {
        let destination = self
            .transport
            .scan(rules, ScanOptions::from_config(&self.config))
            .await
            .map_err(|e| SyncError::transport(self.transport.describe(), e.to_string()))?;
        let plan = lsync_plan::plan(source, &destination, &self.config);
        info!(
            source = source.len(),
            destination = destination.len(),
            actions = plan.len(),
            "plan ready"
        );
        Ok(plan)
    }

    /// Run the whole sync.
    ///
    /// Dry runs stop after planning and never take the lease. Otherwise the
    /// lease is held from before the destination scan until the record is
    /// written, and is released on every path.
    pub async fn run(&self) -> Result<SessionOutcome, SyncError> {
        if self.config.dry_run {
            return Ok(SessionOutcome::Planned(self.plan().await?));
        }

        let started_at = Local::now();
        let (rules, source) = self.scan_source().await?;
        self.probe().await?;

        let holder = self.config.source.display().to_string();
        let lease = Lease::acquire(Arc::clone(&self.transport), &holder).await?;
        let outcome = self.run_leased(started_at, rules, &source).await;
        if let Err(err) = lease.release().await {
            warn!("failed to release lease: {err}");
        }
        outcome
    }

    async fn run_leased(
        &self,
        started_at: DateTime<Local>,
        rules: Arc<IgnoreRuleSet>,
        source: &ScanResult,
    ) -> Result<SessionOutcome, SyncError> {
        let plan = self.plan_against(rules, source).await?;
        if self.cancel.is_cancelled() {
            return Err(SyncError::Interrupted);
        }

        let report = Executor::new(Arc::clone(&self.transport), &self.config.source)
            .with_retry(RetryPolicy::new(self.config.max_retries))
            .with_cancellation(self.cancel.clone())
            .execute(&plan)
            .await;

        let record = LogRecord::from_report(
            started_at,
            self.config.source.display().to_string(),
            self.config.destination.to_string(),
            self.config.delete,
            self.config.checksum,
            &report,
        );
        if let Err(err) = Journal::new(Arc::clone(&self.transport)).append(&record).await {
            warn!("failed to write log record: {err}");
        }

        info!(
            completed = report.completed.mutations(),
            failed = report.failed(),
            halted = report.halted,
            bytes = report.bytes_transferred,
            "sync finished"
        );
        Ok(SessionOutcome::Executed { plan, report })
    }
}
