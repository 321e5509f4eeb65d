//! Cluster-wide mutual exclusion for reconciliation ticks.
//!
//! Locks are leases: a holder that crashes without releasing loses the lock
//! once its TTL elapses.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub name: String,
    pub holder: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Acquire-with-TTL and release.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take the named lock. `Ok(None)` means another holder has it.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> SyncResult<Option<LockLease>>;

    /// Release a lease. Releasing a lease that already expired or was taken
    /// over is not an error.
    async fn release(&self, lease: &LockLease) -> SyncResult<()>;
}

/// Run `fut` while holding the named lock.
///
/// Returns `Ok(None)` without running `fut` when the lock is held elsewhere.
/// The lease is released whether `fut` succeeds, fails or panics; a panic is
/// resumed after release.
pub async fn lock_execute_and_release<F, T>(
    lock: &dyn LockService,
    name: &str,
    ttl: Duration,
    fut: F,
) -> SyncResult<Option<T>>
where
    F: Future<Output = T> + Send,
{
    let Some(lease) = lock.try_acquire(name, ttl).await? else {
        debug!(lock = %name, "Lock held elsewhere");
        return Ok(None);
    };
    debug!(lock = %name, holder = %lease.holder, expires_at = %lease.expires_at, "Acquired lock");

    let outcome = AssertUnwindSafe(fut).catch_unwind().await;

    if let Err(error) = lock.release(&lease).await {
        warn!(lock = %name, error = %error, "Failed to release lock, lease will expire");
    }

    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn ttl_to_chrono(ttl: Duration) -> SyncResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|e| SyncError::lock(format!("invalid lock ttl: {e}")))
}

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS tuple_sync_locks (
        name TEXT PRIMARY KEY,
        holder UUID NOT NULL,
        acquired_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
";

const ACQUIRE: &str = r"
    INSERT INTO tuple_sync_locks (name, holder, acquired_at, expires_at)
    VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
    ON CONFLICT (name) DO UPDATE
        SET holder = EXCLUDED.holder,
            acquired_at = EXCLUDED.acquired_at,
            expires_at = EXCLUDED.expires_at
        WHERE tuple_sync_locks.expires_at < NOW()
    RETURNING holder, expires_at
";

const RELEASE: &str = "DELETE FROM tuple_sync_locks WHERE name = $1 AND holder = $2";

/// Lease lock kept in a Postgres table.
///
/// Acquisition is a single upsert that only takes over expired rows, so two
/// instances racing for the same lock cannot both win.
#[derive(Debug, Clone)]
pub struct PgLeaseLock {
    pool: PgPool,
}

impl PgLeaseLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the lease table if it does not exist.
    pub async fn ensure_schema(&self) -> SyncResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LockService for PgLeaseLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> SyncResult<Option<LockLease>> {
        let holder = Uuid::new_v4();
        let row: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(ACQUIRE)
            .bind(name)
            .bind(holder)
            .bind(ttl.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(holder, expires_at)| LockLease {
            name: name.to_string(),
            holder,
            expires_at,
        }))
    }

    async fn release(&self, lease: &LockLease) -> SyncResult<()> {
        let result = sqlx::query(RELEASE)
            .bind(&lease.name)
            .bind(lease.holder)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!(lock = %lease.name, holder = %lease.holder, "Lease was no longer held");
        }
        Ok(())
    }
}

/// In-memory lease lock for tests and single-instance runs.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    leases: Mutex<HashMap<String, LockLease>>,
    releases: AtomicUsize,
}

impl InMemoryLockService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `name` on behalf of another instance until `ttl` elapses.
    pub async fn hold_elsewhere(&self, name: &str, ttl: Duration) -> SyncResult<()> {
        let lease = LockLease {
            name: name.to_string(),
            holder: Uuid::new_v4(),
            expires_at: Utc::now() + ttl_to_chrono(ttl)?,
        };
        self.leases.lock().await.insert(name.to_string(), lease);
        Ok(())
    }

    pub async fn is_held(&self, name: &str) -> bool {
        self.leases
            .lock()
            .await
            .get(name)
            .is_some_and(|lease| lease.expires_at > Utc::now())
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> SyncResult<Option<LockLease>> {
        let now = Utc::now();
        let mut leases = self.leases.lock().await;
        if leases.get(name).is_some_and(|lease| lease.expires_at > now) {
            return Ok(None);
        }

        let lease = LockLease {
            name: name.to_string(),
            holder: Uuid::new_v4(),
            expires_at: now + ttl_to_chrono(ttl)?,
        };
        leases.insert(name.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, lease: &LockLease) -> SyncResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        let mut leases = self.leases.lock().await;
        if leases
            .get(&lease.name)
            .is_some_and(|held| held.holder == lease.holder)
        {
            leases.remove(&lease.name);
        }
        Ok(())
    }
}
