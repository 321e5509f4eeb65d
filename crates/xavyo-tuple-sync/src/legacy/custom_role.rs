use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{assignment_subject, LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{object, object_type, relation, Tuple};
use crate::tuple_set::CollectedTupleSet;

pub(crate) const QUERY: &str = r#"
    SELECT r.uid AS role_uid, u.uid AS user_uid, u.is_service_account AS user_is_service_account,
           NULL::text AS team_uid, NULL::text AS builtin_role
    FROM user_role ur
    JOIN role r ON r.id = ur.role_id
    JOIN "user" u ON u.id = ur.user_id
    WHERE ur.org_id = $1 AND r.org_id IN ($1, $2)
      AND r.name NOT LIKE 'managed:%' AND r.name NOT LIKE 'basic:%'
    UNION ALL
    SELECT r.uid, NULL::text, NULL::boolean, t.uid, NULL::text
    FROM team_role tr
    JOIN role r ON r.id = tr.role_id
    JOIN team t ON t.id = tr.team_id
    WHERE tr.org_id = $1 AND r.org_id IN ($1, $2)
      AND r.name NOT LIKE 'managed:%' AND r.name NOT LIKE 'basic:%'
    UNION ALL
    SELECT r.uid, NULL::text, NULL::boolean, NULL::text, br.role
    FROM builtin_role br
    JOIN role r ON r.id = br.role_id
    WHERE br.org_id = $1 AND r.org_id IN ($1, $2)
      AND r.name NOT LIKE 'managed:%' AND r.name NOT LIKE 'basic:%'
"#;

/// Assignment of a custom role to a user, team or basic role.
#[derive(Debug, Clone, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct RoleBindingRow {
    pub role_uid: String,
    pub user_uid: Option<String>,
    pub user_is_service_account: Option<bool>,
    pub team_uid: Option<String>,
    pub builtin_role: Option<String>,
}

pub(crate) fn to_tuples(rows: Vec<RoleBindingRow>) -> CollectedTupleSet {
    let mut set = CollectedTupleSet::new();
    for row in rows {
        let role = object(object_type::ROLE, &row.role_uid);
        match assignment_subject(
            row.user_uid.as_deref(),
            row.user_is_service_account,
            row.team_uid.as_deref(),
            row.builtin_role.as_deref(),
        ) {
            Some(subject) => set.insert(Tuple::new(subject, relation::ASSIGNEE, role)),
            None => warn!(role = %row.role_uid, "Role binding has no subject, skipping"),
        }
    }
    set
}

/// `{subject, assignee, role:<uid>}` tuples for custom roles.
pub struct CustomRoleBindingCollector {
    source: Arc<dyn LegacySource>,
}

impl CustomRoleBindingCollector {
    pub fn new(source: Arc<dyn LegacySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LegacyCollector for CustomRoleBindingCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let rows = self.source.custom_role_bindings(namespace.org_id()).await?;
        Ok(to_tuples(rows))
    }
}
