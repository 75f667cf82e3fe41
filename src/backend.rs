//! Node backend collaborator
//!
//! The engine never talks to a Lightning node directly; the wallet host
//! implements [`NodeBackend`] over whatever RPC it already has (LND, CLN,
//! LDK, ...). The trait carries exactly what the order engine needs: the
//! node identity, the transport capability flags, peer connectivity, the
//! custom-message primitives, and invoice decoding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{OrdersError, OrdersResult};

/// An inbound peer-to-peer custom message
#[derive(Debug, Clone)]
pub struct CustomMessage {
    /// Sending peer's pubkey
    pub peer: String,
    /// Lightning message type
    pub message_type: u16,
    /// Hex-encoded message body
    pub payload_hex: String,
}

/// A decoded BOLT11 payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedInvoice {
    /// Payment hash, hex-encoded
    pub payment_hash: String,
    /// Invoice amount in millisatoshis, if specified
    pub amount_msat: Option<u64>,
    /// Invoice expiry, seconds from the invoice timestamp
    pub expiry_secs: u64,
}

/// Decode a BOLT11 invoice
///
/// The standard implementation behind
/// [`NodeBackend::decode_payment_request`]; backends that prefer their
/// node's own decoder can override the trait method instead.
pub fn decode_bolt11(invoice: &str) -> OrdersResult<DecodedInvoice> {
    let parsed = invoice
        .parse::<lightning_invoice::Bolt11Invoice>()
        .map_err(|e| OrdersError::Validation(format!("Failed to parse BOLT11 invoice: {}", e)))?;

    Ok(DecodedInvoice {
        payment_hash: parsed.payment_hash().to_string(),
        amount_msat: parsed.amount_milli_satoshis(),
        expiry_secs: parsed.expiry_time().as_secs(),
    })
}

/// What the order engine requires from the wallet's Lightning node
#[async_trait]
pub trait NodeBackend: Send + Sync {
    /// Whether the node configuration uses the REST transport for LSPS
    fn supports_lsps1_rest(&self) -> bool;

    /// Whether the node configuration uses the custom-message transport
    /// for LSPS; mutually exclusive with REST per node configuration
    fn supports_lsps_custom_message(&self) -> bool;

    /// The local node's pubkey; stamps new envelopes and scopes the order
    /// list to the active wallet profile
    async fn node_id(&self) -> OrdersResult<String>;

    /// Establish a connection to a peer (`pubkey` + `host:port`)
    async fn connect_peer(&self, node_id: &str, host: &str) -> OrdersResult<()>;

    /// Send a custom message to a connected peer
    async fn send_custom_message(
        &self,
        peer: &str,
        message_type: u16,
        payload_hex: &str,
    ) -> OrdersResult<()>;

    /// Subscribe to the inbound custom-message stream
    fn subscribe_custom_messages(&self) -> broadcast::Receiver<CustomMessage>;

    /// Decode a BOLT11 payment request before handing it to the payment
    /// subsystem
    async fn decode_payment_request(&self, invoice: &str) -> OrdersResult<DecodedInvoice> {
        decode_bolt11(invoice)
    }
}
