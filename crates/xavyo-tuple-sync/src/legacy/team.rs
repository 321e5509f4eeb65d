use std::sync::Arc;

use async_trait::async_trait;

use super::{identity_subject, LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{object, object_type, relation, Tuple};
use crate::tuple_set::CollectedTupleSet;

/// Team membership permission level that grants `admin`.
pub const TEAM_PERMISSION_ADMIN: i32 = 4;

pub(crate) const QUERY: &str = r#"
    SELECT t.uid AS team_uid, u.uid AS user_uid, u.is_service_account, tm.permission
    FROM team_member tm
    JOIN team t ON t.id = tm.team_id
    JOIN "user" u ON u.id = tm.user_id
    WHERE tm.org_id = $1
    ORDER BY t.uid, u.uid
"#;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TeamMemberRow {
    pub team_uid: String,
    pub user_uid: String,
    pub is_service_account: bool,
    pub permission: i32,
}

pub(crate) fn to_tuples(rows: Vec<TeamMemberRow>) -> CollectedTupleSet {
    rows.into_iter()
        .map(|row| {
            let rel = if row.permission == TEAM_PERMISSION_ADMIN {
                relation::ADMIN
            } else {
                relation::MEMBER
            };
            Tuple::new(
                identity_subject(&row.user_uid, row.is_service_account),
                rel,
                object(object_type::TEAM, &row.team_uid),
            )
        })
        .collect()
}

/// `{user|service-account, member|admin, team}` tuples.
pub struct TeamMembershipCollector {
    source: Arc<dyn LegacySource>,
}

impl TeamMembershipCollector {
    pub fn new(source: Arc<dyn LegacySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LegacyCollector for TeamMembershipCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let rows = self.source.team_members(namespace.org_id()).await?;
        Ok(to_tuples(rows))
    }
}
