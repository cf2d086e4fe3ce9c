//! External collaborators of the service.
//!
//! # Data Flow
//! ```text
//! pipeline (under request context)
//!     → auth.rs (GET auth endpoint, traceparent/baggage forwarded)
//!     → store.rs (KeyValueStore trait, in-memory map)
//!     → redis.rs (RESP client for a Redis-compatible server)
//! ```

pub mod auth;
pub mod redis;
pub mod store;

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};

pub use auth::{AuthClient, HttpAuthClient};
pub use self::redis::RedisStore;
pub use store::{KeyValueStore, MemoryStore};

/// Build the store selected by configuration.
pub fn build_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match config.backend {
        StoreBackend::Redis => Arc::new(RedisStore::new(config.address.clone())),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
