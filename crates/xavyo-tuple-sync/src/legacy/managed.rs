use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{assignment_subject, LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::translate::translate_permission;
use crate::tuple_set::CollectedTupleSet;

pub(crate) const QUERY: &str = r#"
    SELECT r.name AS role_name, p.action, p.kind, p.identifier,
           u.uid AS user_uid, u.is_service_account AS user_is_service_account,
           t.uid AS team_uid, br.role AS builtin_role
    FROM permission p
    JOIN role r ON r.id = p.role_id
    LEFT JOIN user_role ur ON ur.role_id = r.id AND ur.org_id = r.org_id
    LEFT JOIN "user" u ON u.id = ur.user_id
    LEFT JOIN team_role tr ON tr.role_id = r.id AND tr.org_id = r.org_id
    LEFT JOIN team t ON t.id = tr.team_id
    LEFT JOIN builtin_role br ON br.role_id = r.id AND br.org_id = r.org_id
    WHERE r.org_id = $1 AND r.name LIKE 'managed:%'
    ORDER BY r.name, p.action, p.identifier
"#;

/// One permission of a managed role joined with whoever holds the role.
#[derive(Debug, Clone, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct ManagedPermissionRow {
    pub role_name: String,
    pub action: String,
    pub kind: String,
    pub identifier: String,
    pub user_uid: Option<String>,
    pub user_is_service_account: Option<bool>,
    pub team_uid: Option<String>,
    pub builtin_role: Option<String>,
}

pub(crate) fn to_tuples(rows: Vec<ManagedPermissionRow>) -> CollectedTupleSet {
    let mut set = CollectedTupleSet::new();
    for row in rows {
        let Some(subject) = assignment_subject(
            row.user_uid.as_deref(),
            row.user_is_service_account,
            row.team_uid.as_deref(),
            row.builtin_role.as_deref(),
        ) else {
            warn!(role = %row.role_name, action = %row.action, "Managed permission has no subject, skipping");
            continue;
        };

        match translate_permission(&subject, &row.action, &row.kind, &row.identifier) {
            Ok(tuple) => set.insert(tuple),
            Err(error) => warn!(
                role = %row.role_name,
                subject = %subject,
                action = %row.action,
                kind = %row.kind,
                identifier = %row.identifier,
                error = %error,
                "Skipping untranslatable managed permission"
            ),
        }
    }
    set
}

/// Resource grants from roles named `managed:*`.
pub struct ManagedPermissionCollector {
    source: Arc<dyn LegacySource>,
}

impl ManagedPermissionCollector {
    pub fn new(source: Arc<dyn LegacySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LegacyCollector for ManagedPermissionCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let rows = self.source.managed_permissions(namespace.org_id()).await?;
        Ok(to_tuples(rows))
    }
}
