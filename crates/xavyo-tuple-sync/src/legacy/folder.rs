use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{LegacyCollector, LegacySource};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{object, object_type, relation, Tuple};
use crate::tuple_set::CollectedTupleSet;

pub(crate) const QUERY: &str = r"
    SELECT f.uid, f.parent_uid
    FROM folder f
    WHERE f.org_id = $1
    ORDER BY f.id
    LIMIT $2 OFFSET $3
";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FolderRow {
    pub uid: String,
    pub parent_uid: Option<String>,
}

impl FolderRow {
    pub fn new(uid: impl Into<String>, parent_uid: Option<&str>) -> Self {
        Self {
            uid: uid.into(),
            parent_uid: parent_uid.map(str::to_string),
        }
    }
}

/// Every folder gets a bucket, so a folder moved to the root loses its stale
/// parent tuple.
pub(crate) fn extend_tuples(set: &mut CollectedTupleSet, rows: Vec<FolderRow>) {
    for row in rows {
        let child = object(object_type::FOLDER, &row.uid);
        match row.parent_uid.as_deref().filter(|p| !p.is_empty()) {
            Some(parent) => set.insert(Tuple::new(
                object(object_type::FOLDER, parent),
                relation::PARENT,
                child,
            )),
            None => set.ensure_object(child),
        }
    }
}

/// `{folder:<parent>, parent, folder:<child>}` tuples from a paged folder scan.
pub struct FolderTreeCollector {
    source: Arc<dyn LegacySource>,
    page_size: i64,
}

impl FolderTreeCollector {
    pub fn new(source: Arc<dyn LegacySource>, page_size: i64) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl LegacyCollector for FolderTreeCollector {
    async fn collect(&self, namespace: &Namespace) -> SyncResult<CollectedTupleSet> {
        let mut set = CollectedTupleSet::new();
        let mut offset = 0;
        let mut pages = 0;

        loop {
            let rows = self
                .source
                .folders_page(namespace.org_id(), self.page_size, offset)
                .await?;
            let fetched = i64::try_from(rows.len()).unwrap_or(i64::MAX);
            extend_tuples(&mut set, rows);
            pages += 1;

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        debug!(
            namespace = %namespace,
            pages,
            folders = set.object_count(),
            "Scanned legacy folders"
        );
        Ok(set)
    }
}
