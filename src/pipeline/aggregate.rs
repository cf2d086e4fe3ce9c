//! Aggregation stage: one auth call plus every stored todo.

use std::sync::Arc;

use crate::collaborators::{AuthClient, KeyValueStore};
use crate::error::AggregationError;
use crate::observability::context::in_child;
use crate::pipeline::types::{AggregatedResponse, TodoItem};

/// Combines the auth payload with the todos found in the store.
#[derive(Clone)]
pub struct Aggregator {
    auth: Arc<dyn AuthClient>,
    store: Arc<dyn KeyValueStore>,
    key_pattern: String,
}

impl Aggregator {
    pub fn new(
        auth: Arc<dyn AuthClient>,
        store: Arc<dyn KeyValueStore>,
        key_pattern: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            store,
            key_pattern: key_pattern.into(),
        }
    }

    /// Fetch the user and all todos.
    ///
    /// Keys are fetched one at a time in enumeration order. A key that
    /// disappears between `keys` and `get` is skipped.
    pub async fn aggregate(&self) -> Result<AggregatedResponse, AggregationError> {
        let user = in_child("auth.authenticate", self.auth.authenticate()).await?;

        let keys = in_child("store.keys", self.store.keys(&self.key_pattern)).await?;
        let mut todos = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(raw) = in_child("store.get", self.store.get(&key)).await? else {
                tracing::debug!(key = %key, "Todo removed before fetch, skipping");
                continue;
            };
            let item: TodoItem = serde_json::from_str(&raw)
                .map_err(|source| AggregationError::MalformedStoredItem { key, source })?;
            todos.push(item);
        }

        tracing::debug!(count = todos.len(), "Todos aggregated");
        Ok(AggregatedResponse { todos, user })
    }
}
