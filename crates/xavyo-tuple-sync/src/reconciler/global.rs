use super::{ReconcileSummary, ResourceReconciler};
use crate::error::SyncResult;
use crate::namespace::Namespace;

/// Runs a resource reconciler once against the cluster namespace.
#[derive(Debug)]
pub struct GlobalReconciler {
    inner: ResourceReconciler,
}

impl GlobalReconciler {
    #[must_use]
    pub fn new(inner: ResourceReconciler) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn reconcile(&self) -> SyncResult<ReconcileSummary> {
        self.inner.reconcile(&Namespace::Cluster).await
    }
}
