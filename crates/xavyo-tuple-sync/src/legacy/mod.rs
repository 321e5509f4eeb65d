//! Legacy tuple collectors.
//!
//! Each collector pairs a parameterized query, owned by its module together
//! with the row type it scans into, with a pure transform from rows to a
//! [`CollectedTupleSet`]. Queries run through a [`LegacySource`], so the
//! transforms can be exercised against [`InMemoryLegacySource`] without a
//! database.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{basic_role_uid, object_type, relation, subject_set};
use crate::tuple_set::CollectedTupleSet;

mod anonymous;
mod basic_role;
mod custom_role;
mod folder;
mod managed;
mod memory;
mod postgres;
mod role_permission;
mod team;

pub use anonymous::{AnonymousBindingCollector, ANONYMOUS_SUBJECT};
pub use basic_role::{BasicRoleBindingCollector, OrgRoleRow, BASIC_ROLES};
pub use custom_role::{CustomRoleBindingCollector, RoleBindingRow};
pub use folder::{FolderRow, FolderTreeCollector};
pub use managed::{ManagedPermissionCollector, ManagedPermissionRow};
pub use memory::{InMemoryLegacySource, LegacyFixture};
pub use postgres::PgLegacySource;
pub use role_permission::{RolePermissionCollector, RolePermissionRow};
pub use team::{TeamMemberRow, TeamMembershipCollector};

/// Read access to the legacy relational model.
///
/// Every method is scoped to one org id. Global roles live in org `0`.
#[async_trait]
pub trait LegacySource: Send + Sync {
    /// Ids of all orgs, ascending.
    async fn org_ids(&self) -> SyncResult<Vec<i64>>;

    /// Resolve an org by its display name.
    async fn org_id_by_name(&self, name: &str) -> SyncResult<Option<i64>>;

    async fn team_members(&self, org_id: i64) -> SyncResult<Vec<TeamMemberRow>>;

    /// One page of folders ordered by id.
    async fn folders_page(&self, org_id: i64, limit: i64, offset: i64)
        -> SyncResult<Vec<FolderRow>>;

    async fn managed_permissions(&self, org_id: i64) -> SyncResult<Vec<ManagedPermissionRow>>;

    async fn basic_role_bindings(&self, org_id: i64) -> SyncResult<Vec<OrgRoleRow>>;

    /// Assignments of non-managed, non-basic roles owned by `org_id` or the global org.
    async fn custom_role_bindings(&self, org_id: i64) -> SyncResult<Vec<RoleBindingRow>>;

    /// Permissions of non-managed, non-basic roles owned by `org_id`.
    async fn role_permissions(&self, org_id: i64) -> SyncResult<Vec<RolePermissionRow>>;
}

/// Builds the tuples the legacy model implies for one namespace.
#[async_trait]
pub trait LegacyCollector: Send + Sync {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet>;
}

/// Subject string for a user or service account.
#[must_use]
pub fn identity_subject(uid: &str, is_service_account: bool) -> String {
    let kind = if is_service_account {
        object_type::SERVICE_ACCOUNT
    } else {
        object_type::USER
    };
    crate::tuple::object(kind, uid)
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Resolve the subject of a role assignment row.
///
/// A user wins over a team, and a team wins over a basic role. Returns `None`
/// when the row names none of them.
#[must_use]
pub fn assignment_subject(
    user_uid: Option<&str>,
    user_is_service_account: Option<bool>,
    team_uid: Option<&str>,
    builtin_role: Option<&str>,
) -> Option<String> {
    if let Some(uid) = present(user_uid) {
        return Some(identity_subject(uid, user_is_service_account.unwrap_or(false)));
    }
    if let Some(uid) = present(team_uid) {
        return Some(subject_set(object_type::TEAM, uid, relation::MEMBER));
    }
    present(builtin_role)
        .map(|role| subject_set(object_type::ROLE, &basic_role_uid(role), relation::ASSIGNEE))
}
