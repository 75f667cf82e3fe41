//! Durable storage for the order log
//!
//! The engine persists orders through the [`OrderStore`] trait: a key-value
//! surface of opaque string blobs, matching what wallet hosts typically
//! expose (secure storage, keychain wrappers). Two implementations ship with
//! the crate: [`MemoryStore`] for tests and ephemeral profiles, and
//! [`SqliteStore`](sqlite::SqliteStore) for on-disk persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::OrdersResult;

pub mod log;
pub mod sqlite;

pub use sqlite::SqliteStore;

/// The single well-known key under which the order log is stored.
///
/// LSPS1 and LSPS7 orders share this key; the `service` field inside each
/// envelope tells them apart.
pub const ORDERS_STORE_KEY: &str = "lsps-orders";

/// Key-value persistence of opaque string blobs
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Read a value, `None` on miss
    async fn get_item(&self, key: &str) -> OrdersResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set_item(&self, key: &str, value: &str) -> OrdersResult<()>;

    /// Remove a value if present
    async fn remove_item(&self, key: &str) -> OrdersResult<()>;
}

/// In-memory store for tests and ephemeral profiles
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_item(&self, key: &str) -> OrdersResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> OrdersResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> OrdersResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
