use std::sync::Arc;

use async_trait::async_trait;

use super::{identity_subject, LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{basic_role_uid, object, object_type, relation, Tuple};
use crate::tuple_set::CollectedTupleSet;

/// Org membership roles.
pub const BASIC_ROLES: [&str; 4] = ["Viewer", "Editor", "Admin", "None"];

pub(crate) const QUERY: &str = r#"
    SELECT u.uid AS user_uid, u.is_service_account, ou.role
    FROM org_user ou
    JOIN "user" u ON u.id = ou.user_id
    WHERE ou.org_id = $1
    ORDER BY u.uid
"#;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrgRoleRow {
    pub user_uid: String,
    pub is_service_account: bool,
    pub role: String,
}

/// Bucket object for a basic role.
pub(crate) fn basic_role_object(role: &str) -> String {
    object(object_type::ROLE, &basic_role_uid(role))
}

/// Every basic role gets a bucket so a user whose role changed loses the old binding.
pub(crate) fn empty_basic_role_buckets() -> CollectedTupleSet {
    let mut set = CollectedTupleSet::new();
    for role in BASIC_ROLES {
        set.ensure_object(basic_role_object(role));
    }
    set
}

pub(crate) fn to_tuples(rows: Vec<OrgRoleRow>) -> CollectedTupleSet {
    let mut set = empty_basic_role_buckets();
    set.extend(rows.into_iter().map(|row| {
        Tuple::new(
            identity_subject(&row.user_uid, row.is_service_account),
            relation::ASSIGNEE,
            basic_role_object(&row.role),
        )
    }));
    set
}

/// `{user|service-account, assignee, role:basic_<role>}` tuples.
pub struct BasicRoleBindingCollector {
    source: Arc<dyn LegacySource>,
}

impl BasicRoleBindingCollector {
    pub fn new(source: Arc<dyn LegacySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LegacyCollector for BasicRoleBindingCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let rows = self.source.basic_role_bindings(namespace.org_id()).await?;
        Ok(to_tuples(rows))
    }
}
