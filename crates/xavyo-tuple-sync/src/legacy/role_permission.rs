use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::translate::translate_permission;
use crate::tuple::{object_type, relation, subject_set};
use crate::tuple_set::CollectedTupleSet;

pub(crate) const QUERY: &str = r"
    SELECT r.uid AS role_uid, p.action, p.kind, p.identifier
    FROM permission p
    JOIN role r ON r.id = p.role_id
    WHERE r.org_id = $1
      AND r.name NOT LIKE 'managed:%' AND r.name NOT LIKE 'basic:%'
    ORDER BY r.uid, p.action, p.identifier
";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RolePermissionRow {
    pub role_uid: String,
    pub action: String,
    pub kind: String,
    pub identifier: String,
}

impl RolePermissionRow {
    pub fn new(role_uid: &str, action: &str, kind: &str, identifier: &str) -> Self {
        Self {
            role_uid: role_uid.to_string(),
            action: action.to_string(),
            kind: kind.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

pub(crate) fn to_tuples(rows: Vec<RolePermissionRow>) -> CollectedTupleSet {
    let mut set = CollectedTupleSet::new();
    for row in rows {
        let subject = subject_set(object_type::ROLE, &row.role_uid, relation::ASSIGNEE);
        match translate_permission(&subject, &row.action, &row.kind, &row.identifier) {
            Ok(tuple) => set.insert(tuple),
            Err(error) => warn!(
                role = %row.role_uid,
                action = %row.action,
                kind = %row.kind,
                identifier = %row.identifier,
                error = %error,
                "Skipping untranslatable role permission"
            ),
        }
    }
    set
}

/// Resource grants held by custom roles, with subject `role:<uid>#assignee`.
///
/// In an org namespace this reads roles of that org. In the cluster namespace
/// it reads global roles (org `0`).
pub struct RolePermissionCollector {
    source: Arc<dyn LegacySource>,
}

impl RolePermissionCollector {
    pub fn new(source: Arc<dyn LegacySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LegacyCollector for RolePermissionCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let rows = self.source.role_permissions(namespace.org_id()).await?;
        Ok(to_tuples(rows))
    }
}
