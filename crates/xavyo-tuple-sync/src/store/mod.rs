//! Tuple store client seam.
//!
//! [`TupleStore`] is the RPC surface of the ReBAC store. [`read_all`] turns its
//! continuation-token paging into a lazy stream, and [`StoreCollector`] builds
//! the per-object view a reconciler diffs against.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::SyncResult;
use crate::namespace::Namespace;
use crate::tuple::{Tuple, TupleKey};

mod collector;
mod memory;
mod openfga;

pub use collector::StoreCollector;
pub use memory::{InMemoryTupleStore, WriteCall};
pub use openfga::OpenFgaStore;

/// Read tuples on one object, or on every object of a type when `object` is a
/// type prefix such as `team:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub namespace: Namespace,
    pub object: String,
    pub relation: Option<String>,
    pub continuation_token: Option<String>,
    pub page_size: u32,
}

impl ReadRequest {
    pub fn new(namespace: Namespace, object: impl Into<String>, page_size: u32) -> Self {
        Self {
            namespace,
            object: object.into(),
            relation: None,
            continuation_token: None,
            page_size,
        }
    }

    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Whether `object` names a type rather than a single object.
    #[must_use]
    pub fn is_type_prefix(&self) -> bool {
        self.object.ends_with(':')
    }

    /// Whether a stored tuple falls inside this request's filter.
    #[must_use]
    pub fn matches(&self, tuple: &Tuple) -> bool {
        let object_matches = if self.is_type_prefix() {
            tuple.object.starts_with(&self.object)
        } else {
            tuple.object == self.object
        };
        object_matches
            && self
                .relation
                .as_deref()
                .is_none_or(|relation| tuple.relation == relation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResponse {
    pub tuples: Vec<Tuple>,
    /// Token for the next page. `None` when this was the last page.
    pub continuation_token: Option<String>,
}

/// Tuples to add and keys to remove, applied together in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub namespace: Namespace,
    pub writes: Vec<Tuple>,
    pub deletes: Vec<TupleKey>,
}

impl WriteRequest {
    pub fn writes(namespace: Namespace, writes: Vec<Tuple>) -> Self {
        Self {
            namespace,
            writes,
            deletes: Vec::new(),
        }
    }

    pub fn deletes(namespace: Namespace, deletes: Vec<TupleKey>) -> Self {
        Self {
            namespace,
            writes: Vec::new(),
            deletes,
        }
    }
}

/// RPC surface of the ReBAC store.
#[async_trait]
pub trait TupleStore: Send + Sync {
    async fn read(&self, request: ReadRequest) -> SyncResult<ReadResponse>;

    async fn write(&self, request: WriteRequest) -> SyncResult<()>;
}

/// Stream every tuple matching `request`, following continuation tokens.
///
/// Pages are fetched lazily as the stream is polled. The first error ends the
/// stream.
pub fn read_all(store: &dyn TupleStore, request: ReadRequest) -> BoxStream<'_, SyncResult<Tuple>> {
    stream::try_unfold(Some(request), move |next| async move {
        match next {
            Some(request) => next_page(store, request).await,
            None => Ok(None),
        }
    })
    .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

async fn next_page(
    store: &dyn TupleStore,
    request: ReadRequest,
) -> SyncResult<Option<(Vec<Tuple>, Option<ReadRequest>)>> {
    let response = store.read(request.clone()).await?;
    let next = response
        .continuation_token
        .filter(|token| !token.is_empty())
        .map(|token| ReadRequest {
            continuation_token: Some(token),
            ..request
        });
    Ok(Some((response.tuples, next)))
}
