//! Authorization tuple reconciliation.
//!
//! Keeps a relationship-based (ReBAC) tuple store consistent with the legacy
//! relational role and permission model while both are written. Each
//! reconciler collects the tuples the legacy model implies, diffs them against
//! the store and patches the difference in batches. The
//! [`ReconciliationScheduler`](scheduler::ReconciliationScheduler) runs the
//! reconcilers on a timer under a cluster-wide lease lock.
//!
//! The two stores share no transaction, so consistency is eventual: a pass
//! that fails midway leaves its applied batches in place and the next pass
//! finishes the job.

pub mod batch;
pub mod config;
pub mod error;
pub mod legacy;
pub mod lock;
pub mod namespace;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod translate;
pub mod tuple;
pub mod tuple_set;

pub use config::{AnonymousConfig, ConfigError, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use namespace::Namespace;
pub use reconciler::{
    standard_reconcilers, GlobalReconciler, OrphanSpec, ReconcileSummary, ResourceReconciler,
};
pub use scheduler::{ReconciliationScheduler, ScheduledReconciler, SchedulerConfig, TickOutcome};
pub use tuple::{Condition, SubjectKind, SubjectMatcher, Tuple, TupleKey};
pub use tuple_set::CollectedTupleSet;
