use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    FolderRow, LegacySource, ManagedPermissionRow, OrgRoleRow, RoleBindingRow,
    RolePermissionRow, TeamMemberRow,
};
use crate::error::{SyncError, SyncResult};

/// Rows served by [`InMemoryLegacySource`], keyed by org id.
#[derive(Debug, Clone, Default)]
pub struct LegacyFixture {
    pub orgs: Vec<(i64, String)>,
    pub team_members: HashMap<i64, Vec<TeamMemberRow>>,
    pub folders: HashMap<i64, Vec<FolderRow>>,
    pub managed_permissions: HashMap<i64, Vec<ManagedPermissionRow>>,
    pub basic_role_bindings: HashMap<i64, Vec<OrgRoleRow>>,
    pub custom_role_bindings: HashMap<i64, Vec<RoleBindingRow>>,
    pub role_permissions: HashMap<i64, Vec<RolePermissionRow>>,
}

impl LegacyFixture {
    #[must_use]
    pub fn with_org(mut self, id: i64, name: &str) -> Self {
        self.orgs.push((id, name.to_string()));
        self
    }

    #[must_use]
    pub fn with_team_members(mut self, org_id: i64, rows: Vec<TeamMemberRow>) -> Self {
        self.team_members.entry(org_id).or_default().extend(rows);
        self
    }

    #[must_use]
    pub fn with_folders(mut self, org_id: i64, rows: Vec<FolderRow>) -> Self {
        self.folders.entry(org_id).or_default().extend(rows);
        self
    }

    #[must_use]
    pub fn with_managed_permissions(mut self, org_id: i64, rows: Vec<ManagedPermissionRow>) -> Self {
        self.managed_permissions.entry(org_id).or_default().extend(rows);
        self
    }

    #[must_use]
    pub fn with_basic_role_bindings(mut self, org_id: i64, rows: Vec<OrgRoleRow>) -> Self {
        self.basic_role_bindings.entry(org_id).or_default().extend(rows);
        self
    }

    #[must_use]
    pub fn with_custom_role_bindings(mut self, org_id: i64, rows: Vec<RoleBindingRow>) -> Self {
        self.custom_role_bindings.entry(org_id).or_default().extend(rows);
        self
    }

    #[must_use]
    pub fn with_role_permissions(mut self, org_id: i64, rows: Vec<RolePermissionRow>) -> Self {
        self.role_permissions.entry(org_id).or_default().extend(rows);
        self
    }
}

/// In-memory legacy source for tests.
#[derive(Debug, Default)]
pub struct InMemoryLegacySource {
    fixture: RwLock<LegacyFixture>,
    failing: AtomicBool,
    org_listing_failing: AtomicBool,
    folder_page_calls: AtomicUsize,
}

impl InMemoryLegacySource {
    #[must_use]
    pub fn new(fixture: LegacyFixture) -> Self {
        Self {
            fixture: RwLock::new(fixture),
            failing: AtomicBool::new(false),
            org_listing_failing: AtomicBool::new(false),
            folder_page_calls: AtomicUsize::new(0),
        }
    }

    /// Mutate the fixture between passes.
    pub async fn update(&self, f: impl FnOnce(&mut LegacyFixture)) {
        let mut fixture = self.fixture.write().await;
        f(&mut fixture);
    }

    /// Make every query fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only the org listing fail until reset.
    pub fn set_org_listing_failing(&self, failing: bool) {
        self.org_listing_failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn folder_page_calls(&self) -> usize {
        self.folder_page_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn rows<T: Clone>(
        &self,
        org_id: i64,
        select: impl FnOnce(&LegacyFixture) -> &HashMap<i64, Vec<T>>,
    ) -> SyncResult<Vec<T>> {
        self.check()?;
        let fixture = self.fixture.read().await;
        Ok(select(&fixture).get(&org_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LegacySource for InMemoryLegacySource {
    async fn org_ids(&self) -> SyncResult<Vec<i64>> {
        self.check()?;
        if self.org_listing_failing.load(Ordering::SeqCst) {
            return Err(SyncError::Database(sqlx::Error::PoolTimedOut));
        }
        let fixture = self.fixture.read().await;
        let mut ids: Vec<i64> = fixture.orgs.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn org_id_by_name(&self, name: &str) -> SyncResult<Option<i64>> {
        self.check()?;
        let fixture = self.fixture.read().await;
        Ok(fixture
            .orgs
            .iter()
            .find(|(_, org_name)| org_name == name)
            .map(|(id, _)| *id))
    }

    async fn team_members(&self, org_id: i64) -> SyncResult<Vec<TeamMemberRow>> {
        self.rows(org_id, |f| &f.team_members).await
    }

    async fn folders_page(
        &self,
        org_id: i64,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<FolderRow>> {
        self.folder_page_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows(org_id, |f| &f.folders).await?;
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }

    async fn managed_permissions(&self, org_id: i64) -> SyncResult<Vec<ManagedPermissionRow>> {
        self.rows(org_id, |f| &f.managed_permissions).await
    }

    async fn basic_role_bindings(&self, org_id: i64) -> SyncResult<Vec<OrgRoleRow>> {
        self.rows(org_id, |f| &f.basic_role_bindings).await
    }

    async fn custom_role_bindings(&self, org_id: i64) -> SyncResult<Vec<RoleBindingRow>> {
        self.rows(org_id, |f| &f.custom_role_bindings).await
    }

    async fn role_permissions(&self, org_id: i64) -> SyncResult<Vec<RolePermissionRow>> {
        self.rows(org_id, |f| &f.role_permissions).await
    }
}
