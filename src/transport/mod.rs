//! Transport strategy for talking to an LSP
//!
//! Two mutually exclusive ways to reach a provider exist: REST calls to a
//! JSON HTTP endpoint, and JSON-RPC framed inside Lightning peer-to-peer
//! custom messages. Which one applies is a property of the node
//! configuration, surfaced through the [`NodeBackend`] capability flags.
//!
//! Whatever the transport, the engine only ever sees plain [`Order`]-shaped
//! results: both implementations normalize legacy `{"result": ...}`
//! wrappers at the decode step, and the only transport detail that escapes
//! is the [`TransportTarget`] recorded in each envelope so a later refresh
//! can replay the request over the same path.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::backend::NodeBackend;
use crate::config::TransportConfig;
use crate::model::{
    CreateOrderRequest, ExtensionOrderRequest, LspInfo, LspsService, Order, OrderRecord,
    TransportTarget,
};
use crate::{OrdersError, OrdersResult};

pub mod peer;
pub mod rest;

pub use peer::PeerTransport;
pub use rest::RestTransport;

/// A way to reach an LSP, independent of wire details
#[async_trait]
pub trait LspsTransport: Send + Sync {
    /// Query the LSP's capabilities and option bounds
    async fn get_info(&self, service: LspsService) -> OrdersResult<LspInfo>;

    /// Submit an LSPS1 channel order
    async fn create_order(&self, request: &CreateOrderRequest) -> OrdersResult<Order>;

    /// Submit an LSPS7 lease extension order
    async fn create_extension_order(&self, request: &ExtensionOrderRequest) -> OrdersResult<Order>;

    /// Fetch the current state of an order
    async fn get_order(&self, service: LspsService, order_id: &str) -> OrdersResult<Order>;

    /// The replayable target this transport talks to
    fn target(&self) -> TransportTarget;
}

/// Decode an order out of a raw JSON value, accepting both wire shapes
pub(crate) fn decode_order(value: Value) -> OrdersResult<Order> {
    let record: OrderRecord = serde_json::from_value(value)
        .map_err(|e| OrdersError::Transport(format!("Malformed order response: {}", e)))?;
    Ok(record.into_order())
}

/// Strip a legacy `{"result": ...}` wrapper from a non-order response
pub(crate) fn unwrap_result(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Builds transports for targets, enforcing the node's capability flags
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Resolve a transport for the given target
    async fn transport(&self, target: &TransportTarget) -> OrdersResult<Arc<dyn LspsTransport>>;
}

/// Default factory backed by [`RestTransport`] and [`PeerTransport`]
pub struct DefaultTransportFactory {
    backend: Arc<dyn NodeBackend>,
    config: TransportConfig,
    /// Peer transports are cached so correlation state and the dispatcher
    /// task survive across calls to the same LSP
    peers: Mutex<HashMap<String, Arc<PeerTransport>>>,
}

impl DefaultTransportFactory {
    /// Create a factory over the given backend
    pub fn new(backend: Arc<dyn NodeBackend>, config: TransportConfig) -> Self {
        Self {
            backend,
            config,
            peers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn transport(&self, target: &TransportTarget) -> OrdersResult<Arc<dyn LspsTransport>> {
        match target {
            TransportTarget::Rest { endpoint } => {
                if !self.backend.supports_lsps1_rest() {
                    return Err(OrdersError::Validation(
                        "Node configuration does not support the LSPS REST transport".to_string(),
                    ));
                }
                Ok(Arc::new(RestTransport::new(
                    endpoint.clone(),
                    self.config.rest_timeout_secs,
                )))
            }
            TransportTarget::Peer { peer, uri } => {
                if !self.backend.supports_lsps_custom_message() {
                    return Err(OrdersError::Validation(
                        "Node configuration does not support the LSPS custom message transport"
                            .to_string(),
                    ));
                }
                let mut peers = self.peers.lock().await;
                let transport = peers.entry(peer.clone()).or_insert_with(|| {
                    Arc::new(PeerTransport::new(
                        self.backend.clone(),
                        peer.clone(),
                        uri.clone(),
                        self.config.peer_timeout_secs,
                    ))
                });
                Ok(transport.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CustomMessage;
    use tokio::sync::broadcast;

    struct FlagBackend {
        rest: bool,
        custom: bool,
        messages: broadcast::Sender<CustomMessage>,
    }

    impl FlagBackend {
        fn new(rest: bool, custom: bool) -> Self {
            Self {
                rest,
                custom,
                messages: broadcast::channel(16).0,
            }
        }
    }

    #[async_trait]
    impl NodeBackend for FlagBackend {
        fn supports_lsps1_rest(&self) -> bool {
            self.rest
        }
        fn supports_lsps_custom_message(&self) -> bool {
            self.custom
        }
        async fn node_id(&self) -> OrdersResult<String> {
            Ok("02abc".to_string())
        }
        async fn connect_peer(&self, _node_id: &str, _host: &str) -> OrdersResult<()> {
            Ok(())
        }
        async fn send_custom_message(
            &self,
            _peer: &str,
            _message_type: u16,
            _payload_hex: &str,
        ) -> OrdersResult<()> {
            Ok(())
        }
        fn subscribe_custom_messages(&self) -> broadcast::Receiver<CustomMessage> {
            self.messages.subscribe()
        }
    }

    fn rest_target() -> TransportTarget {
        TransportTarget::Rest {
            endpoint: "https://lsp.example.com".to_string(),
        }
    }

    fn peer_target() -> TransportTarget {
        TransportTarget::Peer {
            peer: "03def".to_string(),
            uri: "03def@10.0.0.1:9735".to_string(),
        }
    }

    #[tokio::test]
    async fn test_factory_enforces_capability_flags() {
        let rest_only = DefaultTransportFactory::new(
            Arc::new(FlagBackend::new(true, false)),
            TransportConfig::default(),
        );
        assert!(rest_only.transport(&rest_target()).await.is_ok());
        assert!(rest_only.transport(&peer_target()).await.is_err());

        let peer_only = DefaultTransportFactory::new(
            Arc::new(FlagBackend::new(false, true)),
            TransportConfig::default(),
        );
        assert!(peer_only.transport(&rest_target()).await.is_err());
        assert!(peer_only.transport(&peer_target()).await.is_ok());
    }

    #[tokio::test]
    async fn test_factory_caches_peer_transports() {
        let factory = DefaultTransportFactory::new(
            Arc::new(FlagBackend::new(false, true)),
            TransportConfig::default(),
        );
        let a = factory.transport(&peer_target()).await.unwrap();
        let b = factory.transport(&peer_target()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_decode_order_unwraps_result() {
        let wrapped = serde_json::json!({"result": {
            "order_id": "x",
            "order_state": "CREATED",
            "lsp_balance_sat": "1",
            "client_balance_sat": "0",
            "announce_channel": false
        }});
        let order = decode_order(wrapped).unwrap();
        assert_eq!(order.order_id, "x");

        let plain = serde_json::json!({
            "order_id": "y",
            "order_state": "COMPLETED",
            "lsp_balance_sat": "1",
            "client_balance_sat": "0",
            "announce_channel": false
        });
        assert_eq!(decode_order(plain).unwrap().order_id, "y");
    }

    #[test]
    fn test_unwrap_result_passthrough() {
        let plain = serde_json::json!({"options": {}});
        assert_eq!(unwrap_result(plain.clone()), plain);

        let wrapped = serde_json::json!({"result": {"options": {}}});
        assert_eq!(unwrap_result(wrapped), serde_json::json!({"options": {}}));
    }
}
