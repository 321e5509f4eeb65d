use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::basic_role::{basic_role_object, empty_basic_role_buckets, BASIC_ROLES};
use super::{LegacyCollector, LegacySource};
use crate::config::AnonymousConfig;
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{relation, Tuple};
use crate::tuple_set::CollectedTupleSet;

/// Subject standing for every unauthenticated user.
pub const ANONYMOUS_SUBJECT: &str = "anonymous:*";

/// Binds `anonymous:*` to the configured basic role in the configured org.
///
/// All basic role buckets are always returned, so a grant left behind by an
/// earlier configuration is deleted.
pub struct AnonymousBindingCollector {
    source: Arc<dyn LegacySource>,
    config: AnonymousConfig,
}

impl AnonymousBindingCollector {
    pub fn new(source: Arc<dyn LegacySource>, config: AnonymousConfig) -> Self {
        Self { source, config }
    }
}

#[async_trait]
impl LegacyCollector for AnonymousBindingCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let mut set = empty_basic_role_buckets();
        if !self.config.enabled {
            return Ok(set);
        }

        let org_id = self.source.org_id_by_name(&self.config.org_name).await?;
        if org_id != Some(namespace.org_id()) {
            debug!(
                namespace = %namespace,
                org_name = %self.config.org_name,
                "Anonymous org does not match namespace"
            );
            return Ok(set);
        }

        // Only basic role buckets are reconciled.
        if !BASIC_ROLES.contains(&self.config.org_role.as_str()) {
            warn!(org_role = %self.config.org_role, "Anonymous role is not a basic role, skipping");
            return Ok(set);
        }

        set.insert(Tuple::new(
            ANONYMOUS_SUBJECT,
            relation::ASSIGNEE,
            basic_role_object(&self.config.org_role),
        ));
        Ok(set)
    }
}
