//! LSPS-Client: a client-side channel order engine for Lightning wallets
//!
//! This crate implements the wallet-side half of the LSPS channel purchase
//! protocols:
//!
//! - **LSPS1 (JIT channels)**: order a new inbound channel from a Liquidity
//!   Service Provider and pay for it over Lightning or on-chain
//! - **LSPS7 (lease extensions)**: extend the expiry of an existing leased
//!   channel
//! - **Dual transports**: plain REST against an LSP's HTTP endpoint, or
//!   JSON-RPC framed inside Lightning peer-to-peer custom messages
//! - **Durable order log**: orders survive restarts and are reconciled
//!   against the LSP on revisit, with terminal states frozen against stale
//!   responses
//!
//! # Architecture
//!
//! The engine is built around injected collaborators:
//!
//! 1. An [`OrderStore`](store::OrderStore) persists the append-only order log
//! 2. A [`NodeBackend`](backend::NodeBackend) exposes the node identity,
//!    capability flags, and the peer-message primitives
//! 3. [`OrderService`](orders::OrderService) orchestrates the order
//!    lifecycle: create, refresh, reconcile, list
//! 4. [`resolve_payment_actions`](payments::resolve_payment_actions) turns an
//!    order's payment payload into the actions a wallet can offer
//!
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod model;
pub mod orders;
pub mod payments;
pub mod store;
pub mod transport;

pub use config::Config;
pub use model::{Order, OrderEnvelope, OrderState};
pub use orders::OrderService;

/// Error types for the order engine
#[derive(thiserror::Error, Debug)]
pub enum OrdersError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport call failed or returned malformed data
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request did not resolve within its client-side deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Order not present in the local log
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Store read/write or (de)serialization of persisted state failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Node backend error
    #[error("Node backend error: {0}")]
    Node(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl OrdersError {
    /// Whether this error is the timeout sentinel.
    ///
    /// Only timeouts permit the cached-state fallback UX on the refresh
    /// path; other transport failures surface as blocking errors when
    /// creating an order.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OrdersError::Timeout(_))
    }
}

/// Result type alias for order engine operations
pub type OrdersResult<T> = std::result::Result<T, OrdersError>;
