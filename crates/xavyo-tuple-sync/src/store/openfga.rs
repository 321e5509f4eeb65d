//! OpenFGA-compatible HTTP tuple store (reqwest-based).
//!
//! Each namespace maps to the store whose name equals the namespace's display
//! form (`default`, `org-2`, `cluster`). Store ids are resolved once through
//! `GET /stores` and cached.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ReadRequest, ReadResponse, TupleStore, WriteRequest};
use crate::error::{SyncError, SyncResult};
use crate::namespace::Namespace;
use crate::tuple::{Condition, Tuple, TupleKey};

const STORE_LIST_PAGE_SIZE: u32 = 100;

#[derive(Debug, Serialize, Deserialize)]
struct WireCondition {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<WireConditionContext>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireConditionContext {
    #[serde(default)]
    subresources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTupleKey {
    user: String,
    relation: String,
    object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<WireCondition>,
}

impl From<Tuple> for WireTupleKey {
    fn from(tuple: Tuple) -> Self {
        Self {
            user: tuple.subject,
            relation: tuple.relation,
            object: tuple.object,
            condition: tuple.condition.map(|c| WireCondition {
                name: c.name,
                context: Some(WireConditionContext {
                    subresources: c.subresources.into_iter().collect(),
                }),
            }),
        }
    }
}

impl From<WireTupleKey> for Tuple {
    fn from(key: WireTupleKey) -> Self {
        Self {
            subject: key.user,
            relation: key.relation,
            object: key.object,
            condition: key.condition.map(|c| Condition {
                name: c.name,
                subresources: c
                    .context
                    .unwrap_or_default()
                    .subresources
                    .into_iter()
                    .collect::<BTreeSet<_>>(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireDeleteKey {
    user: String,
    relation: String,
    object: String,
}

impl From<TupleKey> for WireDeleteKey {
    fn from(key: TupleKey) -> Self {
        Self {
            user: key.subject,
            relation: key.relation,
            object: key.object,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireReadFilter {
    object: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relation: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireReadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    tuple_key: Option<WireReadFilter>,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStoredTuple {
    key: WireTupleKey,
}

#[derive(Debug, Deserialize)]
struct WireReadResponse {
    #[serde(default)]
    tuples: Vec<WireStoredTuple>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTupleKeys<T> {
    tuple_keys: Vec<T>,
}

#[derive(Debug, Serialize)]
struct WireWriteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<WireTupleKeys<WireTupleKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<WireTupleKeys<WireDeleteKey>>,
}

#[derive(Debug, Deserialize)]
struct WireStore {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireListStoresResponse {
    #[serde(default)]
    stores: Vec<WireStore>,
    #[serde(default)]
    continuation_token: Option<String>,
}

/// HTTP client for an OpenFGA-compatible tuple store.
#[derive(Debug)]
pub struct OpenFgaStore {
    base_url: String,
    api_token: Option<String>,
    http_client: Client,
    store_ids: RwLock<HashMap<Namespace, String>>,
}

impl OpenFgaStore {
    /// Create a client with its own connection pool.
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent("xavyo-tuple-sync/1.0")
            .build()?;
        Ok(Self::with_http_client(base_url, api_token, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: &str, api_token: Option<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            http_client,
            store_ids: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::store(format!("HTTP {status}: {body}")));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Resolve the store id backing `namespace`.
    async fn store_id(&self, namespace: &Namespace) -> SyncResult<String> {
        if let Some(id) = self.store_ids.read().await.get(namespace) {
            return Ok(id.clone());
        }

        let name = namespace.to_string();
        let mut continuation_token: Option<String> = None;
        loop {
            let url = format!("{}/stores", self.base_url);
            let mut builder = self
                .http_client
                .get(&url)
                .query(&[("page_size", STORE_LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &continuation_token {
                builder = builder.query(&[("continuation_token", token)]);
            }
            let response = self.authorize(builder).send().await?;
            let page: WireListStoresResponse = Self::handle_response(response).await?;

            if let Some(store) = page.stores.into_iter().find(|s| s.name == name) {
                debug!(namespace = %namespace, store_id = %store.id, "Resolved tuple store");
                self.store_ids
                    .write()
                    .await
                    .insert(*namespace, store.id.clone());
                return Ok(store.id);
            }

            match page.continuation_token.filter(|t| !t.is_empty()) {
                Some(token) => continuation_token = Some(token),
                None => {
                    return Err(SyncError::store(format!(
                        "no tuple store named '{name}'"
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl TupleStore for OpenFgaStore {
    async fn read(&self, request: ReadRequest) -> SyncResult<ReadResponse> {
        let store_id = self.store_id(&request.namespace).await?;
        let url = format!("{}/stores/{store_id}/read", self.base_url);

        // Type-only reads carry no tuple key; results are filtered locally.
        let tuple_key = (!request.is_type_prefix()).then(|| WireReadFilter {
            object: request.object.clone(),
            relation: request.relation.clone(),
        });
        let body = WireReadRequest {
            tuple_key,
            page_size: request.page_size,
            continuation_token: request.continuation_token.clone(),
        };

        let response = self
            .authorize(self.http_client.post(&url).json(&body))
            .send()
            .await?;
        let page: WireReadResponse = Self::handle_response(response).await?;

        let tuples = page
            .tuples
            .into_iter()
            .map(|stored| Tuple::from(stored.key))
            .filter(|tuple| request.matches(tuple))
            .collect();

        Ok(ReadResponse {
            tuples,
            continuation_token: page.continuation_token.filter(|t| !t.is_empty()),
        })
    }

    async fn write(&self, request: WriteRequest) -> SyncResult<()> {
        if request.writes.is_empty() && request.deletes.is_empty() {
            return Ok(());
        }

        let store_id = self.store_id(&request.namespace).await?;
        let url = format!("{}/stores/{store_id}/write", self.base_url);

        let writes = (!request.writes.is_empty()).then(|| WireTupleKeys {
            tuple_keys: request.writes.into_iter().map(WireTupleKey::from).collect(),
        });
        let deletes = (!request.deletes.is_empty()).then(|| WireTupleKeys {
            tuple_keys: request.deletes.into_iter().map(WireDeleteKey::from).collect(),
        });

        let response = self
            .authorize(
                self.http_client
                    .post(&url)
                    .json(&WireWriteRequest { writes, deletes }),
            )
            .send()
            .await?;
        let _: serde_json::Value = Self::handle_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_wire_shape() {
        let tuple = Tuple::new("user:u1", "resource", "folder:f1").with_condition(
            Condition::subresource_filter(["dashboards:view", "dashboards:edit"]),
        );
        let wire = serde_json::to_value(WireTupleKey::from(tuple)).unwrap();
        assert_eq!(
            wire,
            json!({
                "user": "user:u1",
                "relation": "resource",
                "object": "folder:f1",
                "condition": {
                    "name": "subresource_filter",
                    "context": { "subresources": ["dashboards:edit", "dashboards:view"] }
                }
            })
        );
    }

    #[test]
    fn test_unconditioned_key_omits_condition() {
        let wire =
            serde_json::to_value(WireTupleKey::from(Tuple::new("user:u1", "member", "team:t1")))
                .unwrap();
        assert!(wire.get("condition").is_none());
    }

    #[test]
    fn test_wire_condition_without_context() {
        let key: WireTupleKey = serde_json::from_value(json!({
            "user": "user:u1",
            "relation": "resource",
            "object": "folder:f1",
            "condition": { "name": "subresource_filter" }
        }))
        .unwrap();
        let tuple = Tuple::from(key);
        assert_eq!(
            tuple.condition,
            Some(Condition::subresource_filter(Vec::<String>::new()))
        );
    }
}
