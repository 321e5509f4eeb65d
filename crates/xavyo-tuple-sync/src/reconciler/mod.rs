//! Resource reconcilers.
//!
//! A [`ResourceReconciler`] pairs one legacy collector with one store
//! collector. Each pass collects the legacy tuples for a namespace, reads what
//! the store holds for every object the legacy side names, diffs the two and
//! applies deletes before writes in fixed-size batches. Applied batches are
//! never rolled back; a failed pass is corrected by the next one.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::batch::for_each_batch;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::SyncResult;
use crate::legacy::LegacyCollector;
use crate::namespace::Namespace;
use crate::store::{StoreCollector, TupleStore, WriteRequest};
use crate::tuple::TupleKey;
use crate::tuple_set::CollectedTupleSet;

mod diff;
mod global;
mod registry;

pub use diff::{diff, TupleChanges};
pub use global::GlobalReconciler;
pub use registry::standard_reconcilers;

/// Store-only scan for tuples on objects the legacy model no longer knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanSpec {
    /// Object type prefix to scan, e.g. `team:`.
    pub object_prefix: String,
    pub relations: Vec<String>,
    /// Objects under these prefixes are owned elsewhere and never treated as orphans.
    pub exclude_prefixes: Vec<String>,
}

impl OrphanSpec {
    pub fn new<I, S>(object_prefix: impl Into<String>, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object_prefix: object_prefix.into(),
            relations: relations.into_iter().map(Into::into).collect(),
            exclude_prefixes: Vec::new(),
        }
    }

    #[must_use]
    pub fn excluding(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    fn covers(&self, object: &str) -> bool {
        object.starts_with(&self.object_prefix)
            && !self
                .exclude_prefixes
                .iter()
                .any(|prefix| object.starts_with(prefix.as_str()))
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Objects the legacy side produced buckets for.
    pub objects: usize,
    pub writes: usize,
    pub deletes: usize,
    /// Deletes that came from the orphan scan. Included in `deletes`.
    pub orphans: usize,
    /// Write requests sent to the store.
    pub batches: usize,
    /// Whether the changes were applied (false in dry-run mode).
    pub applied: bool,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.writes == 0 && self.deletes == 0
    }
}

/// Diff-and-patch loop for one resource kind.
pub struct ResourceReconciler {
    name: String,
    legacy: Arc<dyn LegacyCollector>,
    collector: StoreCollector,
    orphans: Vec<OrphanSpec>,
    store: Arc<dyn TupleStore>,
    batch_size: usize,
    dry_run: bool,
}

impl ResourceReconciler {
    pub fn new(
        name: impl Into<String>,
        legacy: Arc<dyn LegacyCollector>,
        collector: StoreCollector,
        store: Arc<dyn TupleStore>,
    ) -> Self {
        Self {
            name: name.into(),
            legacy,
            collector,
            orphans: Vec::new(),
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_orphans(mut self, orphans: Vec<OrphanSpec>) -> Self {
        self.orphans = orphans;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one pass against `namespace`.
    #[instrument(skip(self, namespace), fields(reconciler = %self.name, namespace = %namespace))]
    pub async fn reconcile(&self, namespace: &Namespace) -> SyncResult<ReconcileSummary> {
        let legacy = self.legacy.collect(namespace).await?;
        let mut changes = self.object_changes(&legacy, namespace).await?;
        let orphans = self.orphan_deletes(&legacy, namespace).await?;

        let mut summary = ReconcileSummary {
            objects: legacy.object_count(),
            orphans: orphans.len(),
            ..ReconcileSummary::default()
        };
        changes.deletes.extend(orphans);
        summary.writes = changes.writes.len();
        summary.deletes = changes.deletes.len();

        if changes.is_empty() {
            debug!(objects = summary.objects, "Store already converged");
            return Ok(summary);
        }

        if self.dry_run {
            for key in &changes.deletes {
                info!(tuple = %key, "Dry run: would delete");
            }
            for tuple in &changes.writes {
                info!(tuple = %tuple, "Dry run: would write");
            }
            return Ok(summary);
        }

        summary.batches = self.apply(namespace, &changes).await?;
        summary.applied = true;
        Ok(summary)
    }

    /// Diff every legacy bucket against the store.
    async fn object_changes(
        &self,
        legacy: &CollectedTupleSet,
        namespace: &Namespace,
    ) -> SyncResult<TupleChanges> {
        let mut changes = TupleChanges::default();
        for (object, bucket) in legacy.buckets() {
            let stored = self
                .collector
                .collect(self.store.as_ref(), object, namespace)
                .await?;
            changes.extend(diff(bucket, &stored));
        }
        Ok(changes)
    }

    /// Keys of stored tuples whose object has no legacy bucket.
    async fn orphan_deletes(
        &self,
        legacy: &CollectedTupleSet,
        namespace: &Namespace,
    ) -> SyncResult<Vec<TupleKey>> {
        let mut orphans = Vec::new();
        for spec in &self.orphans {
            let scanner = self.collector.with_relations(&spec.relations);
            let stored = scanner
                .collect_prefix(self.store.as_ref(), &spec.object_prefix, namespace)
                .await?;
            orphans.extend(
                stored
                    .into_keys()
                    .filter(|key| spec.covers(&key.object) && !legacy.contains_object(&key.object)),
            );
        }
        orphans.sort();
        orphans.dedup();
        if !orphans.is_empty() {
            debug!(count = orphans.len(), "Found orphaned tuples");
        }
        Ok(orphans)
    }

    /// Send deletes, then writes, in batches. Returns the number of requests.
    async fn apply(&self, namespace: &Namespace, changes: &TupleChanges) -> SyncResult<usize> {
        let store = self.store.as_ref();

        let delete_batches = for_each_batch(&changes.deletes, self.batch_size, |chunk| {
            debug!(size = chunk.len(), "Deleting tuple batch");
            store.write(WriteRequest::deletes(*namespace, chunk.to_vec()))
        })
        .await?;

        let write_batches = for_each_batch(&changes.writes, self.batch_size, |chunk| {
            debug!(size = chunk.len(), "Writing tuple batch");
            store.write(WriteRequest::writes(*namespace, chunk.to_vec()))
        })
        .await?;

        info!(
            writes = changes.writes.len(),
            deletes = changes.deletes.len(),
            batches = delete_batches + write_batches,
            "Applied tuple changes"
        );
        Ok(delete_batches + write_batches)
    }
}

impl std::fmt::Debug for ResourceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler")
            .field("name", &self.name)
            .field("collector", &self.collector)
            .field("orphans", &self.orphans)
            .field("batch_size", &self.batch_size)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}
