use std::collections::BTreeMap;

use futures::TryStreamExt;

use super::{read_all, ReadRequest, TupleStore};
use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{SubjectMatcher, Tuple, TupleKey};

/// Reads what the tuple store currently holds for a set of relations.
///
/// Only tuples whose subject the matcher accepts are returned, so reconcilers
/// that share objects and relations do not see each other's tuples.
#[derive(Debug, Clone)]
pub struct StoreCollector {
    relations: Vec<String>,
    subjects: SubjectMatcher,
    page_size: u32,
}

impl StoreCollector {
    pub fn new<I, S>(relations: I, subjects: SubjectMatcher, page_size: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relations: relations.into_iter().map(Into::into).collect(),
            subjects,
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    /// Same subjects and page size, different relations.
    #[must_use]
    pub fn with_relations(&self, relations: &[String]) -> Self {
        Self {
            relations: relations.to_vec(),
            subjects: self.subjects.clone(),
            page_size: self.page_size,
        }
    }

    /// Stored tuples on `object`, keyed without conditions.
    pub async fn collect(
        &self,
        store: &dyn TupleStore,
        object: &str,
        namespace: &Namespace,
    ) -> SyncResult<BTreeMap<TupleKey, Tuple>> {
        let mut stored = BTreeMap::new();
        for relation in &self.relations {
            let request =
                ReadRequest::new(*namespace, object, self.page_size).with_relation(relation);
            let tuples: Vec<Tuple> = read_all(store, request).try_collect().await?;
            stored.extend(
                tuples
                    .into_iter()
                    .filter(|t| self.subjects.matches(&t.subject))
                    .map(|t| (t.key(), t)),
            );
        }
        Ok(stored)
    }

    /// Stored tuples on every object starting with `prefix`, e.g. `team:`.
    ///
    /// Type-prefix reads cannot be narrowed by relation on the store side, so
    /// the prefix is read once and relations are filtered here.
    pub async fn collect_prefix(
        &self,
        store: &dyn TupleStore,
        prefix: &str,
        namespace: &Namespace,
    ) -> SyncResult<BTreeMap<TupleKey, Tuple>> {
        let request = ReadRequest::new(*namespace, prefix, self.page_size);
        let tuples: Vec<Tuple> = read_all(store, request).try_collect().await?;
        Ok(tuples
            .into_iter()
            .filter(|t| self.relations.contains(&t.relation))
            .filter(|t| self.subjects.matches(&t.subject))
            .map(|t| (t.key(), t))
            .collect())
    }
}
