//! Peer-to-peer custom message transport
//!
//! When an LSP has no REST endpoint, LSPS traffic rides inside Lightning
//! custom messages: JSON-RPC 2.0 envelopes, hex-encoded into message bodies
//! of type 37913. Requests and responses are correlated by a locally
//! generated id. At most one request per logical method is outstanding at a
//! time; issuing a new one supersedes the pending one, and responses for
//! superseded or unknown ids are discarded without disturbing pending
//! state.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::backend::{CustomMessage, NodeBackend};
use crate::model::{
    CreateOrderRequest, ExtensionOrderRequest, LspInfo, LspsService, Order, TransportTarget,
};
use crate::transport::{decode_order, unwrap_result, LspsTransport};
use crate::{OrdersError, OrdersResult};

/// Lightning message type carrying LSPS JSON-RPC payloads (LSPS0)
pub const LSPS_MESSAGE_TYPE: u16 = 37913;

struct PendingCall {
    id: String,
    tx: oneshot::Sender<OrdersResult<Value>>,
}

/// Custom-message implementation of the LSPS transport
pub struct PeerTransport {
    backend: Arc<dyn NodeBackend>,
    /// Peer node pubkey
    peer: String,
    /// Connection URI (`pubkey@host:port`)
    uri: String,
    /// Reply deadline per request
    timeout: Duration,
    /// Whether connect_peer has run for this transport
    connected: tokio::sync::Mutex<bool>,
    /// Outstanding request per logical method, latest id wins
    pending: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PeerTransport {
    /// Create a transport for the given peer and spawn its dispatcher
    pub fn new(
        backend: Arc<dyn NodeBackend>,
        peer: String,
        uri: String,
        timeout_secs: u64,
    ) -> Self {
        let pending: Arc<Mutex<HashMap<String, PendingCall>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut messages = backend.subscribe_custom_messages();
        let dispatcher_pending = pending.clone();
        let dispatcher_peer = peer.clone();
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(msg) => Self::handle_message(&dispatcher_peer, &dispatcher_pending, msg),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Custom message stream lagged, {} messages dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Custom message stream closed, dispatcher for {} exiting", dispatcher_peer);
                        break;
                    }
                }
            }
        });

        Self {
            backend,
            peer,
            uri,
            timeout: Duration::from_secs(timeout_secs),
            connected: tokio::sync::Mutex::new(false),
            pending,
        }
    }

    fn handle_message(
        peer: &str,
        pending: &Mutex<HashMap<String, PendingCall>>,
        msg: CustomMessage,
    ) {
        if msg.message_type != LSPS_MESSAGE_TYPE || msg.peer != peer {
            return;
        }

        let bytes = match hex::decode(&msg.payload_hex) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Discarding custom message with invalid hex payload: {}", e);
                return;
            }
        };

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding custom message with malformed JSON: {}", e);
                return;
            }
        };

        let Some(id) = value.get("id").and_then(Value::as_str).map(String::from) else {
            debug!("Discarding custom message without correlation id");
            return;
        };

        let call = {
            let mut pending = pending.lock().expect("pending map poisoned");
            let key = pending
                .iter()
                .find(|(_, call)| call.id == id)
                .map(|(method, _)| method.clone());
            match key {
                Some(method) => pending.remove(&method),
                None => {
                    // unrelated, duplicate, or superseded response
                    debug!("Discarding custom message with unknown correlation id {}", id);
                    return;
                }
            }
        };

        let Some(call) = call else { return };

        let outcome = if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(OrdersError::Transport(format!(
                "LSP returned error {}: {}",
                code, message
            )))
        } else {
            Ok(value.get("result").cloned().unwrap_or(Value::Null))
        };

        // receiver may have timed out already
        let _ = call.tx.send(outcome);
    }

    async fn ensure_connected(&self) -> OrdersResult<()> {
        let mut connected = self.connected.lock().await;
        if *connected {
            return Ok(());
        }

        let host = self.uri.split('@').nth(1).ok_or_else(|| {
            OrdersError::Validation(format!("Invalid peer URI: {}", self.uri))
        })?;

        debug!("Connecting to LSP peer {} at {}", self.peer, host);
        self.backend.connect_peer(&self.peer, host).await?;
        *connected = true;
        Ok(())
    }

    fn clear_pending(&self, method: &str, id: &str) {
        let mut pending = self.pending.lock().expect("pending map poisoned");
        if pending.get(method).map(|c| c.id == id).unwrap_or(false) {
            pending.remove(method);
        }
    }

    async fn call(&self, method: &str, params: Value) -> OrdersResult<Value> {
        self.ensure_connected().await?;

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().expect("pending map poisoned");
            if let Some(superseded) = pending.insert(
                method.to_string(),
                PendingCall { id: id.clone(), tx },
            ) {
                debug!("Superseding pending {} request {}", method, superseded.id);
            }
        }

        let envelope = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        let payload_hex = hex::encode(envelope.to_string());

        debug!("Sending {} request {} to {}", method, id, self.peer);
        if let Err(e) = self
            .backend
            .send_custom_message(&self.peer, LSPS_MESSAGE_TYPE, &payload_hex)
            .await
        {
            self.clear_pending(method, &id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // our sender was dropped: a newer request took the method slot
            Ok(Err(_)) => Err(OrdersError::Transport(format!(
                "{} request superseded by a newer request",
                method
            ))),
            Err(_) => {
                self.clear_pending(method, &id);
                Err(OrdersError::Timeout(format!(
                    "No {} reply from {} within {}s",
                    method,
                    self.peer,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    fn method(service: LspsService, op: &str) -> String {
        match service {
            LspsService::Lsps1 => format!("lsps1.{}", op),
            LspsService::Lsps7 => format!("lsps7.{}", op),
        }
    }
}

#[async_trait]
impl LspsTransport for PeerTransport {
    async fn get_info(&self, service: LspsService) -> OrdersResult<LspInfo> {
        let value = self
            .call(&Self::method(service, "get_info"), serde_json::json!({}))
            .await?;
        serde_json::from_value(unwrap_result(value))
            .map_err(|e| OrdersError::Transport(format!("Malformed get_info response: {}", e)))
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> OrdersResult<Order> {
        let params = serde_json::to_value(request)
            .map_err(|e| OrdersError::Transport(format!("Failed to encode request: {}", e)))?;
        decode_order(self.call("lsps1.create_order", params).await?)
    }

    async fn create_extension_order(&self, request: &ExtensionOrderRequest) -> OrdersResult<Order> {
        let params = serde_json::to_value(request)
            .map_err(|e| OrdersError::Transport(format!("Failed to encode request: {}", e)))?;
        decode_order(self.call("lsps7.create_order", params).await?)
    }

    async fn get_order(&self, service: LspsService, order_id: &str) -> OrdersResult<Order> {
        let params = serde_json::json!({ "order_id": order_id });
        decode_order(self.call(&Self::method(service, "get_order"), params).await?)
    }

    fn target(&self) -> TransportTarget {
        TransportTarget::Peer {
            peer: self.peer.clone(),
            uri: self.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        messages: broadcast::Sender<CustomMessage>,
        sent: Mutex<Vec<String>>,
        connects: AtomicUsize,
    }

    impl MockBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: broadcast::channel(16).0,
                sent: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        /// Correlation id of the n-th request this backend saw
        fn request_id(&self, n: usize) -> String {
            let sent = self.sent.lock().unwrap();
            let bytes = hex::decode(&sent[n]).unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            value["id"].as_str().unwrap().to_string()
        }

        fn respond(&self, peer: &str, id: &str, result: Value) {
            let body = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result});
            let _ = self.messages.send(CustomMessage {
                peer: peer.to_string(),
                message_type: LSPS_MESSAGE_TYPE,
                payload_hex: hex::encode(body.to_string()),
            });
        }
    }

    #[async_trait]
    impl NodeBackend for MockBackend {
        fn supports_lsps1_rest(&self) -> bool {
            false
        }
        fn supports_lsps_custom_message(&self) -> bool {
            true
        }
        async fn node_id(&self) -> OrdersResult<String> {
            Ok("02local".to_string())
        }
        async fn connect_peer(&self, _node_id: &str, _host: &str) -> OrdersResult<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn send_custom_message(
            &self,
            _peer: &str,
            _message_type: u16,
            payload_hex: &str,
        ) -> OrdersResult<()> {
            self.sent.lock().unwrap().push(payload_hex.to_string());
            Ok(())
        }
        fn subscribe_custom_messages(&self) -> broadcast::Receiver<CustomMessage> {
            self.messages.subscribe()
        }
    }

    fn order_value(order_id: &str, state: &str) -> Value {
        serde_json::json!({
            "order_id": order_id,
            "order_state": state,
            "lsp_balance_sat": "100000",
            "client_balance_sat": "0",
            "announce_channel": false
        })
    }

    async fn wait_for_sent(backend: &MockBackend, count: usize) {
        for _ in 0..200 {
            if backend.sent_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("backend never saw {} sent messages", count);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_response_matched_by_correlation_id() {
        let backend = MockBackend::new();
        let transport = Arc::new(PeerTransport::new(
            backend.clone(),
            "03peer".to_string(),
            "03peer@10.0.0.1:9735".to_string(),
            30,
        ));

        let call = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.get_order(LspsService::Lsps1, "abc").await })
        };

        wait_for_sent(&backend, 1).await;
        let id = backend.request_id(0);

        // unrelated ids must not disturb the pending request
        backend.respond("03peer", "some-other-id", order_value("zzz", "FAILED"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend.respond("03peer", &id, order_value("abc", "COMPLETED"));

        let order = call.await.unwrap().unwrap();
        assert_eq!(order.order_id, "abc");
        assert_eq!(backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_superseded_request_is_discarded() {
        let backend = MockBackend::new();
        let transport = Arc::new(PeerTransport::new(
            backend.clone(),
            "03peer".to_string(),
            "03peer@10.0.0.1:9735".to_string(),
            30,
        ));

        let first = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.get_order(LspsService::Lsps1, "abc").await })
        };
        wait_for_sent(&backend, 1).await;
        let first_id = backend.request_id(0);

        let second = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.get_order(LspsService::Lsps1, "abc").await })
        };
        wait_for_sent(&backend, 2).await;
        let second_id = backend.request_id(1);

        // the superseded id must be ignored, the live one applied
        backend.respond("03peer", &first_id, order_value("abc", "CREATED"));
        backend.respond("03peer", &second_id, order_value("abc", "COMPLETED"));

        let first_outcome = first.await.unwrap();
        assert!(matches!(first_outcome, Err(OrdersError::Transport(_))));

        let order = second.await.unwrap().unwrap();
        assert_eq!(order.order_state, crate::model::OrderState::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reply_deadline_yields_timeout() {
        let backend = MockBackend::new();
        let transport = PeerTransport::new(
            backend.clone(),
            "03peer".to_string(),
            "03peer@10.0.0.1:9735".to_string(),
            0,
        );

        let outcome = transport.get_order(LspsService::Lsps1, "abc").await;
        assert!(matches!(outcome, Err(ref e) if e.is_timeout()));
        // the abandoned entry must not linger in the pending map
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_messages_from_other_peers_ignored() {
        let backend = MockBackend::new();
        let transport = Arc::new(PeerTransport::new(
            backend.clone(),
            "03peer".to_string(),
            "03peer@10.0.0.1:9735".to_string(),
            30,
        ));

        let call = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.get_order(LspsService::Lsps1, "abc").await })
        };
        wait_for_sent(&backend, 1).await;
        let id = backend.request_id(0);

        // right id, wrong peer: must be discarded
        backend.respond("03other", &id, order_value("abc", "FAILED"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend.respond("03peer", &id, order_value("abc", "COMPLETED"));
        let order = call.await.unwrap().unwrap();
        assert_eq!(order.order_state, crate::model::OrderState::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_uri_rejected() {
        let backend = MockBackend::new();
        let transport = PeerTransport::new(
            backend.clone(),
            "03peer".to_string(),
            "missing-host".to_string(),
            30,
        );

        let outcome = transport.get_order(LspsService::Lsps1, "abc").await;
        assert!(matches!(outcome, Err(OrdersError::Validation(_))));
        assert_eq!(backend.sent_count(), 0);
    }
}
