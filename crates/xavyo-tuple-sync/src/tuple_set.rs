use std::collections::BTreeMap;

use crate::tuple::{Tuple, TupleKey};

/// Tuples grouped by object.
///
/// Every tuple in a bucket shares the bucket's object. Inserting a tuple whose
/// key already exists merges conditions instead of duplicating the tuple. An
/// empty bucket is meaningful: it tells the reconciler the object exists in the
/// legacy model with no grants, so every stored tuple on it is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedTupleSet {
    buckets: BTreeMap<String, BTreeMap<TupleKey, Tuple>>,
}

impl CollectedTupleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tuple, merging it with an existing tuple of the same key.
    pub fn insert(&mut self, tuple: Tuple) {
        let bucket = self.buckets.entry(tuple.object.clone()).or_default();
        let key = tuple.key();
        match bucket.get_mut(&key) {
            Some(existing) => existing.merge(tuple),
            None => {
                bucket.insert(key, tuple);
            }
        }
    }

    /// Make sure a bucket exists for `object`, even if it stays empty.
    pub fn ensure_object(&mut self, object: impl Into<String>) {
        self.buckets.entry(object.into()).or_default();
    }

    #[must_use]
    pub fn contains_object(&self, object: &str) -> bool {
        self.buckets.contains_key(object)
    }

    #[must_use]
    pub fn bucket(&self, object: &str) -> Option<&BTreeMap<TupleKey, Tuple>> {
        self.buckets.get(object)
    }

    /// Iterate over `(object, bucket)` pairs in object order.
    pub fn buckets(&self) -> impl Iterator<Item = (&String, &BTreeMap<TupleKey, Tuple>)> {
        self.buckets.iter()
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.buckets.values().flat_map(BTreeMap::values)
    }

    /// Number of buckets.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of tuples across all buckets.
    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl FromIterator<Tuple> for CollectedTupleSet {
    fn from_iter<I: IntoIterator<Item = Tuple>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Tuple> for CollectedTupleSet {
    fn extend<I: IntoIterator<Item = Tuple>>(&mut self, iter: I) {
        for tuple in iter {
            self.insert(tuple);
        }
    }
}
