use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ReadRequest, ReadResponse, TupleStore, WriteRequest};
use crate::error::{SyncError, SyncResult};
use crate::namespace::Namespace;
use crate::tuple::{Tuple, TupleKey};

/// Shape of one recorded write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCall {
    pub namespace: Namespace,
    pub writes: usize,
    pub deletes: usize,
}

/// In-memory tuple store for tests.
///
/// Behaves like a strict store: writing a key that already exists or deleting
/// a key that does not exist rejects the whole request. Continuation tokens
/// are offsets into the key-ordered result.
#[derive(Debug, Default)]
pub struct InMemoryTupleStore {
    tuples: RwLock<HashMap<Namespace, BTreeMap<TupleKey, Tuple>>>,
    write_calls: Mutex<Vec<WriteCall>>,
    read_calls: AtomicUsize,
    fail_writes_from: Mutex<Option<usize>>,
    fail_reads: AtomicBool,
}

impl InMemoryTupleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert tuples directly, bypassing write validation and call recording.
    pub async fn seed(&self, namespace: Namespace, tuples: impl IntoIterator<Item = Tuple>) {
        let mut all = self.tuples.write().await;
        let stored = all.entry(namespace).or_default();
        for tuple in tuples {
            stored.insert(tuple.key(), tuple);
        }
    }

    /// Snapshot of a namespace in key order.
    pub async fn tuples(&self, namespace: Namespace) -> Vec<Tuple> {
        let all = self.tuples.read().await;
        all.get(&namespace)
            .map(|stored| stored.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.write_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Reject every write request from the `n`th one on (zero based).
    pub fn fail_writes_from(&self, n: Option<usize>) {
        if let Ok(mut slot) = self.fail_writes_from.lock() {
            *slot = n;
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn record_write(&self, call: WriteCall) -> SyncResult<()> {
        let mut calls = self
            .write_calls
            .lock()
            .map_err(|_| SyncError::store("write log poisoned"))?;
        let index = calls.len();
        calls.push(call);

        let fail_from = self
            .fail_writes_from
            .lock()
            .map_err(|_| SyncError::store("failure switch poisoned"))?;
        if fail_from.is_some_and(|n| index >= n) {
            return Err(SyncError::store(format!("injected write failure on call {index}")));
        }
        Ok(())
    }
}

#[async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn read(&self, request: ReadRequest) -> SyncResult<ReadResponse> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::store("injected read failure"));
        }

        let offset = match request.continuation_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SyncError::store(format!("invalid continuation token '{token}'")))?,
            None => 0,
        };
        let page_size = usize::try_from(request.page_size).unwrap_or(usize::MAX).max(1);

        let all = self.tuples.read().await;
        let matching: Vec<&Tuple> = all
            .get(&request.namespace)
            .map(|stored| stored.values().filter(|t| request.matches(t)).collect())
            .unwrap_or_default();

        let tuples: Vec<Tuple> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|t| (*t).clone())
            .collect();
        let end = offset + tuples.len();
        let continuation_token = (end < matching.len()).then(|| end.to_string());

        Ok(ReadResponse {
            tuples,
            continuation_token,
        })
    }

    async fn write(&self, request: WriteRequest) -> SyncResult<()> {
        self.record_write(WriteCall {
            namespace: request.namespace,
            writes: request.writes.len(),
            deletes: request.deletes.len(),
        })?;

        let mut all = self.tuples.write().await;
        let stored = all.entry(request.namespace).or_default();

        let mut next = stored.clone();
        for key in &request.deletes {
            if next.remove(key).is_none() {
                return Err(SyncError::store(format!(
                    "cannot delete a tuple which does not exist: {key}"
                )));
            }
        }
        for tuple in request.writes {
            let key = tuple.key();
            if next.contains_key(&key) {
                return Err(SyncError::store(format!(
                    "cannot write a tuple which already exists: {key}"
                )));
            }
            next.insert(key, tuple);
        }

        *stored = next;
        Ok(())
    }
}
