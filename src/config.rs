//! Configuration for the order engine
//!
//! Configuration is loaded from TOML files or built programmatically.
//!
//! # Example Configuration File
//!
//! ```toml
//! [engine]
//! refresh_timeout_ms = 3000
//!
//! [transport]
//! rest_timeout_secs = 10
//! peer_timeout_secs = 30
//!
//! [store]
//! url = "sqlite:lsps-client.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{OrdersError, OrdersResult};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Order lifecycle engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Durable store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Order lifecycle engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Client-side deadline for a refresh request, in milliseconds.
    ///
    /// When a refresh does not resolve within this deadline the engine
    /// falls back to the last persisted snapshot instead of blocking.
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_timeout_ms: default_refresh_timeout_ms(),
        }
    }
}

fn default_refresh_timeout_ms() -> u64 {
    3_000
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// HTTP request timeout for the REST transport, in seconds
    #[serde(default = "default_rest_timeout_secs")]
    pub rest_timeout_secs: u64,

    /// Reply deadline for a peer-to-peer custom message request, in seconds
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rest_timeout_secs: default_rest_timeout_secs(),
            peer_timeout_secs: default_peer_timeout_secs(),
        }
    }
}

fn default_rest_timeout_secs() -> u64 {
    10
}

fn default_peer_timeout_secs() -> u64 {
    30
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store URL or path (e.g. `sqlite:lsps-client.db`, `sqlite::memory:`)
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Data directory relative store paths are resolved against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_store_url() -> String {
    "sqlite:lsps-client.db".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lsps-client"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: impl AsRef<std::path::Path>) -> OrdersResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| OrdersError::Config(format!("Failed to read config file: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| OrdersError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the store URL, making it relative to `data_dir` if needed
    pub fn resolve_store_url(&self) -> String {
        let url = &self.store.url;

        if url.starts_with("sqlite:/") || url == "sqlite::memory:" {
            return url.clone();
        }

        let path = url.strip_prefix("sqlite:").unwrap_or(url);

        if std::path::Path::new(path).is_absolute() {
            return url.clone();
        }

        let db_path = self.store.data_dir.join(path);
        format!("sqlite:{}", db_path.display())
    }

    /// Validate the configuration
    pub fn validate(&self) -> OrdersResult<()> {
        if self.engine.refresh_timeout_ms == 0 {
            return Err(OrdersError::Config(
                "Refresh timeout must be greater than zero".to_string(),
            ));
        }

        if self.transport.rest_timeout_secs == 0 {
            return Err(OrdersError::Config(
                "REST timeout must be greater than zero".to_string(),
            ));
        }

        if self.transport.peer_timeout_secs == 0 {
            return Err(OrdersError::Config(
                "Peer reply timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.refresh_timeout_ms, 3_000);
        assert_eq!(config.transport.rest_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.engine.refresh_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transport.peer_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            refresh_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.refresh_timeout_ms, 5_000);
        assert_eq!(config.transport.rest_timeout_secs, 10);
        assert_eq!(config.store.url, "sqlite:lsps-client.db");
    }

    #[test]
    fn test_resolve_store_url() {
        let mut config = Config::default();
        config.store.data_dir = PathBuf::from("/var/lib/lsps-client");
        assert_eq!(
            config.resolve_store_url(),
            "sqlite:/var/lib/lsps-client/lsps-client.db"
        );

        config.store.url = "sqlite::memory:".to_string();
        assert_eq!(config.resolve_store_url(), "sqlite::memory:");
    }
}
