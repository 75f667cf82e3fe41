//! SQLite-backed order store
//!
//! A minimal key-value table over `rusqlite`, suitable as the durable store
//! on platforms without a host-provided secure storage wrapper.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::store::OrderStore;
use crate::{OrdersError, OrdersResult};

/// SQLite key-value store
#[derive(Clone)]
pub struct SqliteStore {
    /// SQLite connection (wrapped in Arc<Mutex> for thread safety)
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Connect to the store
    ///
    /// Accepts a `sqlite:`-prefixed URL, a bare path, or `sqlite::memory:`.
    pub async fn connect(store_url: &str) -> anyhow::Result<Self> {
        info!("Opening order store at {}", store_url);

        let path = if store_url.starts_with("sqlite:") {
            store_url.strip_prefix("sqlite:").unwrap_or(store_url)
        } else {
            store_url
        };

        // Ensure the directory exists for file-based stores
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(path)?;
        Self::run_migrations(&conn)?;

        info!("Order store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
        debug!("Running order store migrations...");

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv_items (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        debug!("Order store migrations completed");
        Ok(())
    }
}

fn map_store_error(e: impl std::fmt::Display) -> OrdersError {
    OrdersError::Persistence(format!("Store error: {}", e))
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn get_item(&self, key: &str) -> OrdersResult<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM kv_items WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_store_error)
    }

    async fn set_item(&self, key: &str, value: &str) -> OrdersResult<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO kv_items (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
            [key, value, updated_at.as_str()],
        )
        .map_err(map_store_error)?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> OrdersResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv_items WHERE key = ?1", [key])
            .map_err(map_store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.get_item("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_roundtrip_and_upsert() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

        store.set_item("orders", "[]").await.unwrap();
        assert_eq!(
            store.get_item("orders").await.unwrap().as_deref(),
            Some("[]")
        );

        store.set_item("orders", "[1]").await.unwrap();
        assert_eq!(
            store.get_item("orders").await.unwrap().as_deref(),
            Some("[1]")
        );

        store.remove_item("orders").await.unwrap();
        assert_eq!(store.get_item("orders").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");
        let url = format!("sqlite:{}", path.display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.set_item("orders", "persisted").await.unwrap();
        }

        let store = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(
            store.get_item("orders").await.unwrap().as_deref(),
            Some("persisted")
        );
    }
}
