use std::collections::BTreeMap;

use crate::tuple::{Tuple, TupleKey};

/// Writes and deletes needed to make the store match the legacy model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleChanges {
    pub writes: Vec<Tuple>,
    pub deletes: Vec<TupleKey>,
}

impl TupleChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    pub fn extend(&mut self, other: TupleChanges) {
        self.writes.extend(other.writes);
        self.deletes.extend(other.deletes);
    }
}

/// Diff one object's legacy tuples against what the store holds for it.
///
/// A key present on both sides whose full tuple differs (for instance a
/// different capability set) is deleted and rewritten.
#[must_use]
pub fn diff(
    legacy: &BTreeMap<TupleKey, Tuple>,
    stored: &BTreeMap<TupleKey, Tuple>,
) -> TupleChanges {
    let mut changes = TupleChanges::default();

    for (key, tuple) in legacy {
        match stored.get(key) {
            None => changes.writes.push(tuple.clone()),
            Some(existing) if existing != tuple => {
                changes.deletes.push(key.clone());
                changes.writes.push(tuple.clone());
            }
            Some(_) => {}
        }
    }

    changes.deletes.extend(
        stored
            .keys()
            .filter(|key| !legacy.contains_key(*key))
            .cloned(),
    );

    changes
}
