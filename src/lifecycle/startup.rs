//! Startup seeding.
//!
//! The default todos are written once, concurrently, under an `init` span
//! that is separate from any request trace.

use futures_util::future::try_join_all;
use tracing::Instrument;

use crate::collaborators::KeyValueStore;
use crate::error::StoreError;

/// Keys and names written at startup.
pub const SEED_TODOS: [(&str, &str); 4] = [
    ("todo:1", "Install OpenTelemetry SDK"),
    ("todo:2", "Deploy OpenTelemetry Collector"),
    ("todo:3", "Configure sampling rule"),
    ("todo:4", "You are OpenTelemetry master!"),
];

/// Write [`SEED_TODOS`] into `store`.
pub async fn seed_defaults(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    let span = tracing::info_span!("init", otel.name = "Set default items");

    async {
        let writes = SEED_TODOS.iter().map(|(key, name)| async move {
            let value = serde_json::json!({ "name": name }).to_string();
            store.set(key, &value).await
        });
        try_join_all(writes).await?;
        tracing::info!(count = SEED_TODOS.len(), "Default todos written");
        Ok::<(), StoreError>(())
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryStore;
    use crate::pipeline::TodoItem;

    #[tokio::test]
    async fn test_seed_defaults() {
        let store = MemoryStore::new();
        seed_defaults(&store).await.unwrap();

        assert_eq!(store.len(), 4);
        let raw = store.get("todo:4").await.unwrap().unwrap();
        let item: TodoItem = serde_json::from_str(&raw).unwrap();
        assert_eq!(item.name, "You are OpenTelemetry master!");
    }
}
