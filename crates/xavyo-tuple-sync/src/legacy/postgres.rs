//! PostgreSQL-backed legacy source.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    basic_role, custom_role, folder, managed, role_permission, team, FolderRow, LegacySource,
    ManagedPermissionRow, OrgRoleRow, RoleBindingRow, RolePermissionRow, TeamMemberRow,
};
use crate::error::SyncResult;
use crate::namespace::GLOBAL_ORG_ID;

const ORG_IDS_QUERY: &str = "SELECT id FROM org ORDER BY id";
const ORG_BY_NAME_QUERY: &str = "SELECT id FROM org WHERE name = $1";

/// Runs collector queries against the legacy database.
#[derive(Debug, Clone)]
pub struct PgLegacySource {
    pool: PgPool,
}

impl PgLegacySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_org<T>(&self, query: &'static str, org_id: i64) -> SyncResult<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let rows = sqlx::query_as::<_, T>(query)
            .bind(org_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl LegacySource for PgLegacySource {
    async fn org_ids(&self) -> SyncResult<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(ORG_IDS_QUERY)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn org_id_by_name(&self, name: &str) -> SyncResult<Option<i64>> {
        let id: Option<(i64,)> = sqlx::query_as(ORG_BY_NAME_QUERY)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(|(id,)| id))
    }

    async fn team_members(&self, org_id: i64) -> SyncResult<Vec<TeamMemberRow>> {
        self.fetch_by_org(team::QUERY, org_id).await
    }

    async fn folders_page(
        &self,
        org_id: i64,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<FolderRow>> {
        let rows = sqlx::query_as::<_, FolderRow>(folder::QUERY)
            .bind(org_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn managed_permissions(&self, org_id: i64) -> SyncResult<Vec<ManagedPermissionRow>> {
        self.fetch_by_org(managed::QUERY, org_id).await
    }

    async fn basic_role_bindings(&self, org_id: i64) -> SyncResult<Vec<OrgRoleRow>> {
        self.fetch_by_org(basic_role::QUERY, org_id).await
    }

    async fn custom_role_bindings(&self, org_id: i64) -> SyncResult<Vec<RoleBindingRow>> {
        let rows = sqlx::query_as::<_, RoleBindingRow>(custom_role::QUERY)
            .bind(org_id)
            .bind(GLOBAL_ORG_ID)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn role_permissions(&self, org_id: i64) -> SyncResult<Vec<RolePermissionRow>> {
        self.fetch_by_org(role_permission::QUERY, org_id).await
    }
}
