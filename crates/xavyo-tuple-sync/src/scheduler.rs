//! Reconciliation scheduler.
//!
//! Drives an ordered list of reconcilers on a fixed interval. Every tick runs
//! under a cluster-wide lease lock; when another instance holds it the tick is
//! skipped. Per-org reconcilers run once for every org the legacy store knows,
//! global reconcilers run once against the cluster namespace.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{SyncConfig, DEFAULT_INTERVAL_SECS, DEFAULT_LOCK_TTL_SECS};
use crate::error::{SyncError, SyncResult};
use crate::legacy::LegacySource;
use crate::lock::{lock_execute_and_release, LockService};
use crate::namespace::Namespace;
use crate::reconciler::{GlobalReconciler, ReconcileSummary, ResourceReconciler};

/// Name of the cluster-wide reconciliation lock.
pub const RECONCILE_LOCK_NAME: &str = "tuple-sync-reconcile";

/// A reconciler and the scope it runs in.
#[derive(Debug)]
pub enum ScheduledReconciler {
    /// Runs once per org.
    PerOrg(ResourceReconciler),
    /// Runs once against the cluster namespace.
    Global(GlobalReconciler),
}

impl ScheduledReconciler {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::PerOrg(reconciler) => reconciler.name(),
            Self::Global(reconciler) => reconciler.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub lock_ttl: Duration,
    /// Run a tick immediately instead of waiting one interval.
    pub run_on_startup: bool,
    pub lock_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            run_on_startup: true,
            lock_name: RECONCILE_LOCK_NAME.to_string(),
        }
    }
}

impl From<&SyncConfig> for SchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: config.interval,
            lock_ttl: config.lock_ttl,
            run_on_startup: config.run_on_startup,
            lock_name: RECONCILE_LOCK_NAME.to_string(),
        }
    }
}

/// Totals for one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Reconciler passes that completed.
    pub passes: usize,
    pub writes: usize,
    pub deletes: usize,
    pub orphans: usize,
    /// Failed passes, each wrapped in [`SyncError::Reconciler`], plus a
    /// failed org listing.
    pub failures: Vec<SyncError>,
}

impl TickReport {
    fn record(&mut self, summary: &ReconcileSummary) {
        self.passes += 1;
        self.writes += summary.writes;
        self.deletes += summary.deletes;
        self.orphans += summary.orphans;
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    /// The lock was held by another instance.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// Log the failure and continue with the next pass.
    Isolate,
    /// Stop the tick and return the failure.
    Propagate,
}

/// Runs the reconciler list on a timer.
pub struct ReconciliationScheduler {
    reconcilers: Vec<ScheduledReconciler>,
    source: Arc<dyn LegacySource>,
    lock: Arc<dyn LockService>,
    config: SchedulerConfig,
}

impl ReconciliationScheduler {
    pub fn new(
        reconcilers: Vec<ScheduledReconciler>,
        source: Arc<dyn LegacySource>,
        lock: Arc<dyn LockService>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            reconcilers,
            source,
            lock,
            config,
        }
    }

    #[must_use]
    pub fn reconcilers(&self) -> &[ScheduledReconciler] {
        &self.reconcilers
    }

    /// Tick on the configured interval until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between ticks; a tick in progress runs to
    /// completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            reconcilers = self.reconcilers.len(),
            interval_secs = self.config.interval.as_secs(),
            lock_ttl_secs = self.config.lock_ttl.as_secs(),
            "Starting reconciliation scheduler"
        );

        if self.config.run_on_startup && !shutdown.is_cancelled() {
            self.scheduled_tick().await;
        }

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping reconciliation scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    self.scheduled_tick().await;
                }
            }
        }
    }

    /// Run one tick, logging and continuing past failing reconcilers.
    pub async fn tick(&self) -> SyncResult<TickOutcome> {
        self.locked_tick(FailureMode::Isolate).await
    }

    /// Run one tick and return the first failure.
    pub async fn run_once(&self) -> SyncResult<TickOutcome> {
        self.locked_tick(FailureMode::Propagate).await
    }

    async fn scheduled_tick(&self) {
        match self.tick().await {
            Ok(TickOutcome::Completed(report)) => info!(
                passes = report.passes,
                writes = report.writes,
                deletes = report.deletes,
                orphans = report.orphans,
                failures = report.failures.len(),
                "Reconciliation tick completed"
            ),
            Ok(TickOutcome::Skipped) => {
                debug!("Reconciliation lock held elsewhere, skipping tick");
            }
            Err(e) => error!(error = %e, "Reconciliation tick failed"),
        }
    }

    async fn locked_tick(&self, mode: FailureMode) -> SyncResult<TickOutcome> {
        let outcome = lock_execute_and_release(
            self.lock.as_ref(),
            &self.config.lock_name,
            self.config.lock_ttl,
            self.execute(mode),
        )
        .await?;

        match outcome {
            Some(report) => report.map(TickOutcome::Completed),
            None => Ok(TickOutcome::Skipped),
        }
    }

    async fn execute(&self, mode: FailureMode) -> SyncResult<TickReport> {
        let mut report = TickReport::default();

        // Without the org list only global reconcilers can run.
        let org_ids = match self.source.org_ids().await {
            Ok(org_ids) => org_ids,
            Err(e) if mode == FailureMode::Isolate => {
                warn!(error = %e, "Failed to list orgs, running global reconcilers only");
                report.failures.push(e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        for scheduled in &self.reconcilers {
            match scheduled {
                ScheduledReconciler::PerOrg(reconciler) => {
                    for org_id in &org_ids {
                        let namespace = Namespace::Org(*org_id);
                        let result = reconciler.reconcile(&namespace).await;
                        Self::settle(&mut report, mode, reconciler.name(), namespace, result)?;
                    }
                }
                ScheduledReconciler::Global(reconciler) => {
                    let result = reconciler.reconcile().await;
                    Self::settle(&mut report, mode, reconciler.name(), Namespace::Cluster, result)?;
                }
            }
        }

        Ok(report)
    }

    fn settle(
        report: &mut TickReport,
        mode: FailureMode,
        name: &str,
        namespace: Namespace,
        result: SyncResult<ReconcileSummary>,
    ) -> SyncResult<()> {
        match result {
            Ok(summary) => {
                if !summary.is_noop() {
                    info!(
                        reconciler = %name,
                        namespace = %namespace,
                        objects = summary.objects,
                        writes = summary.writes,
                        deletes = summary.deletes,
                        orphans = summary.orphans,
                        batches = summary.batches,
                        applied = summary.applied,
                        "Reconciled"
                    );
                }
                report.record(&summary);
                Ok(())
            }
            Err(e) => {
                let error = SyncError::reconciler(name, namespace, e);
                match mode {
                    FailureMode::Propagate => Err(error),
                    FailureMode::Isolate => {
                        warn!(
                            reconciler = %name,
                            namespace = %namespace,
                            retryable = error.is_retryable(),
                            error = %error,
                            "Reconciler failed, continuing"
                        );
                        report.failures.push(error);
                        Ok(())
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ReconciliationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationScheduler")
            .field("reconcilers", &self.reconcilers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
