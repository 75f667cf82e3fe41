//! Wire and persistence models for LSPS1/LSPS7 orders
//!
//! The shapes here mirror what LSPs actually send, across two generations of
//! the protocol: older providers return flat payment fields and wrap
//! responses in `{"result": ...}`, current ones nest `bolt11`/`onchain`
//! sub-objects and return the order directly. Both generations must parse,
//! and both may appear in the persisted order log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state an LSP reports for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Order accepted, awaiting payment/funding
    #[serde(rename = "CREATED")]
    Created,
    /// Channel funded, order fulfilled
    #[serde(rename = "COMPLETED")]
    Completed,
    /// Order failed or expired
    #[serde(rename = "FAILED")]
    Failed,
}

impl OrderState {
    /// Terminal states must not be overwritten by a stale poll
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Failed)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Created => write!(f, "CREATED"),
            OrderState::Completed => write!(f, "COMPLETED"),
            OrderState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Which LSPS protocol an order belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LspsService {
    /// LSPS1: purchase of a new JIT channel
    #[default]
    #[serde(rename = "LSPS1")]
    Lsps1,
    /// LSPS7: extension of an existing channel lease
    #[serde(rename = "LSPS7")]
    Lsps7,
}

impl std::fmt::Display for LspsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LspsService::Lsps1 => write!(f, "LSPS1"),
            LspsService::Lsps7 => write!(f, "LSPS7"),
        }
    }
}

/// An LSP-reported order
///
/// Balance amounts are string-encoded integers on the wire, per LSPS1; they
/// are kept as strings here and only parsed where arithmetic is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Server-assigned order identity, immutable for the order's lifetime
    pub order_id: String,

    /// Current order state
    pub order_state: OrderState,

    /// Balance the LSP will hold after channel open (sat, string-encoded)
    #[serde(default)]
    pub lsp_balance_sat: String,

    /// Balance the client will hold after channel open (sat, string-encoded)
    #[serde(default)]
    pub client_balance_sat: String,

    /// Leased channel lifetime in blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_expiry_blocks: Option<u32>,

    /// Blocks within which the LSP commits to confirm the funding tx
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_confirms_within_blocks: Option<u32>,

    /// Confirmations required before the channel is usable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_channel_confirmations: Option<u32>,

    /// Whether the channel will be announced to the network
    #[serde(default)]
    pub announce_channel: bool,

    /// Order creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Order expiry time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Discount/authorization token, if one was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Payment payload (either generation, see [`Payment`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,

    /// Channel details, present only once funding occurs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<OrderChannel>,
}

/// Channel details reported once an order's funding transaction exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderChannel {
    /// Funding transaction outpoint (`txid:vout`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_outpoint: Option<String>,

    /// When the channel was funded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funded_at: Option<DateTime<Utc>>,

    /// When the lease expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Raw payment payload, accepting both wire generations simultaneously
///
/// Legacy providers put `lightning_invoice`/`bolt11_invoice`,
/// `onchain_address` and the totals directly on this object; current ones
/// nest them under [`bolt11`](Payment::bolt11) / [`onchain`](Payment::onchain).
/// Call [`Payment::normalize`] once at ingestion instead of re-interpreting
/// the shape at every call site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    /// Payment state; independent of the order state (a payment can be
    /// pending while the order remains CREATED)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Legacy: BOLT11 invoice, older field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lightning_invoice: Option<String>,

    /// Legacy: BOLT11 invoice, newer-legacy field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bolt11_invoice: Option<String>,

    /// Legacy: on-chain payment address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_address: Option<String>,

    /// Legacy: monolithic on-chain payment object, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain_payment: Option<serde_json::Value>,

    /// Legacy: total LSP fee (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_total_sat: Option<String>,

    /// Legacy: total amount due (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_total_sat: Option<String>,

    /// Legacy: minimum fee rate for a zero-conf open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fee_for_0conf: Option<u64>,

    /// Legacy: minimum confirmations for an on-chain payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_onchain_payment_confirmations: Option<u32>,

    /// Current: Lightning payment terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bolt11: Option<Bolt11Payment>,

    /// Current: on-chain payment terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain: Option<OnchainPayment>,
}

/// Nested Lightning payment terms (current LSPS1/LSPS7 shape)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bolt11Payment {
    /// BOLT11 invoice to pay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,
    /// Payment state for this method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Total amount due over this method (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_total_sat: Option<String>,
    /// LSP fee portion (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_total_sat: Option<String>,
    /// When the invoice expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Nested on-chain payment terms (current LSPS1/LSPS7 shape)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnchainPayment {
    /// Address to pay to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// LSP fee portion (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_total_sat: Option<String>,
    /// Total amount due over this method (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_total_sat: Option<String>,
    /// When the quote expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Minimum fee rate for a zero-conf open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fee_for_0conf: Option<u64>,
    /// Minimum confirmations for the payment to count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_onchain_payment_confirmations: Option<u32>,
}

/// Canonical payment terms, produced once at ingestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentInfo {
    /// Lightning terms, if a payable invoice exists in either generation
    pub bolt11: Option<Bolt11Terms>,
    /// On-chain terms, if a payable address exists in either generation
    pub onchain: Option<OnchainTerms>,
    /// Overall payment state (distinct from the order state)
    pub state: Option<String>,
}

/// Normalized Lightning payment terms
#[derive(Debug, Clone, PartialEq)]
pub struct Bolt11Terms {
    /// BOLT11 invoice to pay
    pub invoice: String,
    /// Payment state for this method
    pub state: Option<String>,
    /// Total amount due (sat, string-encoded)
    pub order_total_sat: Option<String>,
    /// LSP fee portion (sat, string-encoded)
    pub fee_total_sat: Option<String>,
    /// Invoice expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Normalized on-chain payment terms
#[derive(Debug, Clone, PartialEq)]
pub struct OnchainTerms {
    /// Address to pay to
    pub address: String,
    /// LSP fee portion (sat, string-encoded)
    pub fee_total_sat: Option<String>,
    /// Total amount due (sat, string-encoded)
    pub order_total_sat: Option<String>,
    /// Quote expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Minimum fee rate for a zero-conf open
    pub min_fee_for_0conf: Option<u64>,
    /// Minimum confirmations for the payment to count
    pub min_onchain_payment_confirmations: Option<u32>,
}

impl Payment {
    /// Normalize either wire generation into canonical [`PaymentInfo`].
    ///
    /// Nested sub-objects win over legacy flat fields when both are present.
    /// A nested on-chain quote needs both an address and a fee total to be
    /// payable; a legacy one only carries the address.
    pub fn normalize(&self) -> PaymentInfo {
        let bolt11 = match &self.bolt11 {
            Some(nested) if nested.invoice.is_some() => Some(Bolt11Terms {
                invoice: nested.invoice.clone().unwrap_or_default(),
                state: nested.state.clone(),
                order_total_sat: nested.order_total_sat.clone(),
                fee_total_sat: nested.fee_total_sat.clone(),
                expires_at: nested.expires_at,
            }),
            _ => self
                .lightning_invoice
                .clone()
                .or_else(|| self.bolt11_invoice.clone())
                .map(|invoice| Bolt11Terms {
                    invoice,
                    state: self.state.clone(),
                    order_total_sat: self.order_total_sat.clone(),
                    fee_total_sat: self.fee_total_sat.clone(),
                    expires_at: None,
                }),
        };

        let onchain = match &self.onchain {
            Some(nested) if nested.address.is_some() && nested.fee_total_sat.is_some() => {
                Some(OnchainTerms {
                    address: nested.address.clone().unwrap_or_default(),
                    fee_total_sat: nested.fee_total_sat.clone(),
                    order_total_sat: nested.order_total_sat.clone(),
                    expires_at: nested.expires_at,
                    min_fee_for_0conf: nested.min_fee_for_0conf,
                    min_onchain_payment_confirmations: nested.min_onchain_payment_confirmations,
                })
            }
            _ => self.onchain_address.clone().map(|address| OnchainTerms {
                address,
                fee_total_sat: self.fee_total_sat.clone(),
                order_total_sat: self.order_total_sat.clone(),
                expires_at: None,
                min_fee_for_0conf: self.min_fee_for_0conf,
                min_onchain_payment_confirmations: self.min_onchain_payment_confirmations,
            }),
        };

        PaymentInfo {
            bolt11,
            onchain,
            state: self.state.clone(),
        }
    }
}

/// An order as it appears on the wire or in the persisted log: either the
/// order itself or wrapped in `{"result": ...}` by older providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderRecord {
    /// Plain order (canonical shape)
    Plain(Order),
    /// Legacy `{"result": ...}` wrapper
    Wrapped {
        /// The wrapped order
        result: Order,
    },
}

impl OrderRecord {
    /// The order, unwrapped
    pub fn order(&self) -> &Order {
        match self {
            OrderRecord::Plain(order) => order,
            OrderRecord::Wrapped { result } => result,
        }
    }

    /// The order id, unwrapped
    pub fn order_id(&self) -> &str {
        &self.order().order_id
    }

    /// Consume the record, yielding the unwrapped order
    pub fn into_order(self) -> Order {
        match self {
            OrderRecord::Plain(order) => order,
            OrderRecord::Wrapped { result } => result,
        }
    }
}

impl From<Order> for OrderRecord {
    fn from(order: Order) -> Self {
        OrderRecord::Plain(order)
    }
}

/// Where an order was submitted, recorded so the same transport can be
/// replayed for later refreshes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportTarget {
    /// REST endpoint base URL
    Rest {
        /// Base URL of the LSP's HTTP API
        endpoint: String,
    },
    /// Peer-to-peer custom message transport
    Peer {
        /// Peer node pubkey
        peer: String,
        /// Connection URI (`pubkey@host:port`)
        uri: String,
    },
}

/// The unit of persistence: an order plus the metadata needed to re-query it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEnvelope {
    /// The order (either wire shape is accepted from old records)
    pub order: OrderRecord,

    /// The local node identity that created the order; scopes visibility
    /// so orders never leak across wallet profiles
    #[serde(rename = "clientPubkey")]
    pub client_pubkey: String,

    /// Transport the order was created over
    #[serde(flatten)]
    pub target: TransportTarget,

    /// Which LSPS protocol the order belongs to; legacy records predate the
    /// field and default to LSPS1
    #[serde(default)]
    pub service: LspsService,
}

impl OrderEnvelope {
    /// The unwrapped order id this envelope is keyed by
    pub fn order_id(&self) -> &str {
        self.order.order_id()
    }

    /// Replace the order wholesale with a fresher state, normalizing to the
    /// canonical plain shape
    pub fn replace_order(&mut self, fresh: Order) {
        self.order = OrderRecord::Plain(fresh);
    }
}

/// LSPS1 `create_order` request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Balance the LSP should hold (sat, string-encoded)
    pub lsp_balance_sat: String,
    /// Balance the client should hold (sat, string-encoded)
    pub client_balance_sat: String,
    /// Confirmations required before the channel is usable
    pub required_channel_confirmations: u32,
    /// Blocks within which funding must confirm
    pub funding_confirms_within_blocks: u32,
    /// Requested lease lifetime in blocks
    pub channel_expiry_blocks: u32,
    /// Discount/authorization token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Refund address should the order fail after an on-chain payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_onchain_address: Option<String>,
    /// Whether the channel should be announced
    pub announce_channel: bool,
}

/// LSPS7 `create_order` request payload, keyed by the channel being extended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionOrderRequest {
    /// The channel whose lease is being extended
    pub channel_id: String,
    /// Requested extension in blocks
    pub channel_extension_expiry_blocks: u32,
    /// Discount/authorization token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Per-channel extension bounds, carried alongside an LSPS7 order.
///
/// These drive the block-count input range and are never persisted with the
/// order itself.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionContext {
    /// Maximum extension the LSP will sell for this channel, in blocks
    pub max_extension_in_blocks: u32,
    /// Block at which the current lease expires
    pub expiration_block: u32,
}

/// LSP capabilities and bounds from `get_info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LspInfo {
    /// Option bounds advertised by the LSP
    #[serde(default)]
    pub options: LspOptions,
}

/// LSPS1 `get_info` option bounds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LspOptions {
    /// Minimum confirmations the LSP requires on the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_required_channel_confirmations: Option<u32>,
    /// Minimum blocks-to-confirm commitment the LSP offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_funding_confirms_within_blocks: Option<u32>,
    /// Minimum confirmations for on-chain payments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_onchain_payment_confirmations: Option<u32>,
    /// Whether zero channel reserve is supported
    #[serde(default)]
    pub supports_zero_channel_reserve: bool,
    /// Minimum on-chain payment size (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_onchain_payment_size_sat: Option<String>,
    /// Maximum lease lifetime in blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_channel_expiry_blocks: Option<u32>,
    /// Minimum client balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_initial_client_balance_sat: Option<String>,
    /// Maximum client balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_initial_client_balance_sat: Option<String>,
    /// Minimum LSP balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_initial_lsp_balance_sat: Option<String>,
    /// Maximum LSP balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_initial_lsp_balance_sat: Option<String>,
    /// Minimum total channel balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_channel_balance_sat: Option<String>,
    /// Maximum total channel balance (sat, string-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_channel_balance_sat: Option<String>,
}

/// A display-ready order summary produced by the list projector
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    /// Server-assigned order id
    pub order_id: String,
    /// Current order state
    pub state: OrderState,
    /// When the order was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the channel was funded, if it was
    pub funded_at: Option<DateTime<Utc>>,
    /// LSP-side balance (sat, string-encoded)
    pub lsp_balance_sat: String,
    /// Which LSPS protocol the order belongs to
    pub service: LspsService,
}
