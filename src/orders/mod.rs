//! Order lifecycle engine
//!
//! [`OrderService`] orchestrates the life of a channel order: create →
//! await confirmation → persist → on revisit, refresh over the same
//! transport → reconcile → terminal-state freeze.
//!
//! There is no locking around the durable log. Correctness under concurrent
//! refreshes comes from the merge rule being idempotent: only terminal
//! states are persisted (unless the caller explicitly overrides), the log is
//! re-read immediately before every write-back, and envelopes are located
//! by order id value rather than position.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::backend::NodeBackend;
use crate::config::Config;
use crate::model::{
    CreateOrderRequest, ExtensionContext, ExtensionOrderRequest, LspInfo, LspsService, Order,
    OrderEnvelope, OrderSummary, TransportTarget,
};
use crate::store::{log, OrderStore};
use crate::transport::{DefaultTransportFactory, TransportFactory};
use crate::{OrdersError, OrdersResult};

mod list;

pub use list::project_summaries;

/// User-chosen parameters for a new LSPS1 channel order
#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    /// Where to submit the order
    pub target: TransportTarget,
    /// Balance the LSP should hold after open (sat)
    pub lsp_balance_sat: u64,
    /// Balance the client should hold after open (sat)
    pub client_balance_sat: u64,
    /// Confirmations required before the channel is usable
    pub required_channel_confirmations: u32,
    /// Blocks within which funding must confirm
    pub funding_confirms_within_blocks: u32,
    /// Requested lease lifetime in blocks
    pub channel_expiry_blocks: u32,
    /// Discount/authorization token
    pub token: Option<String>,
    /// Refund address should the order fail after an on-chain payment
    pub refund_onchain_address: Option<String>,
    /// Whether the channel should be announced
    pub announce_channel: bool,
    /// LSP bounds to validate against, when already fetched
    pub lsp_info: Option<LspInfo>,
}

impl CreateOrderParams {
    fn validate(&self) -> OrdersResult<()> {
        if self.lsp_balance_sat == 0 && self.client_balance_sat == 0 {
            return Err(OrdersError::Validation(
                "Order must request a non-zero balance".to_string(),
            ));
        }
        if self.channel_expiry_blocks == 0 {
            return Err(OrdersError::Validation(
                "Channel expiry must be at least one block".to_string(),
            ));
        }
        if let Some(info) = &self.lsp_info {
            self.validate_against(info)?;
        }
        Ok(())
    }

    /// Validate the requested balances against the LSP's advertised bounds
    pub fn validate_against(&self, info: &LspInfo) -> OrdersResult<()> {
        let options = &info.options;

        check_bound(
            self.lsp_balance_sat,
            options.min_initial_lsp_balance_sat.as_deref(),
            options.max_initial_lsp_balance_sat.as_deref(),
            "LSP balance",
        )?;
        check_bound(
            self.client_balance_sat,
            options.min_initial_client_balance_sat.as_deref(),
            options.max_initial_client_balance_sat.as_deref(),
            "Client balance",
        )?;

        if let Some(max_expiry) = options.max_channel_expiry_blocks {
            if self.channel_expiry_blocks > max_expiry {
                return Err(OrdersError::Validation(format!(
                    "Channel expiry {} exceeds the LSP maximum of {} blocks",
                    self.channel_expiry_blocks, max_expiry
                )));
            }
        }

        Ok(())
    }

    fn to_request(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            lsp_balance_sat: self.lsp_balance_sat.to_string(),
            client_balance_sat: self.client_balance_sat.to_string(),
            required_channel_confirmations: self.required_channel_confirmations,
            funding_confirms_within_blocks: self.funding_confirms_within_blocks,
            channel_expiry_blocks: self.channel_expiry_blocks,
            token: self.token.clone(),
            refund_onchain_address: self.refund_onchain_address.clone(),
            announce_channel: self.announce_channel,
        }
    }
}

fn check_bound(
    value: u64,
    min: Option<&str>,
    max: Option<&str>,
    what: &str,
) -> OrdersResult<()> {
    if let Some(min) = min.and_then(|s| s.parse::<u64>().ok()) {
        if value < min {
            return Err(OrdersError::Validation(format!(
                "{} {} is below the LSP minimum of {} sat",
                what, value, min
            )));
        }
    }
    if let Some(max) = max.and_then(|s| s.parse::<u64>().ok()) {
        if value > max {
            return Err(OrdersError::Validation(format!(
                "{} {} exceeds the LSP maximum of {} sat",
                what, value, max
            )));
        }
    }
    Ok(())
}

/// User-chosen parameters for an LSPS7 lease extension order
#[derive(Debug, Clone)]
pub struct ExtensionOrderParams {
    /// Where to submit the order
    pub target: TransportTarget,
    /// The channel whose lease is being extended
    pub channel_id: String,
    /// Requested extension in blocks
    pub extension_blocks: u32,
    /// Discount/authorization token
    pub token: Option<String>,
    /// Extension bounds for this channel, when known
    pub context: Option<ExtensionContext>,
}

impl ExtensionOrderParams {
    fn validate(&self) -> OrdersResult<()> {
        if self.channel_id.is_empty() {
            return Err(OrdersError::Validation(
                "Extension order requires a channel id".to_string(),
            ));
        }
        if self.extension_blocks == 0 {
            return Err(OrdersError::Validation(
                "Extension must be at least one block".to_string(),
            ));
        }
        if let Some(context) = &self.context {
            if self.extension_blocks > context.max_extension_in_blocks {
                return Err(OrdersError::Validation(format!(
                    "Extension of {} blocks exceeds the maximum of {} for this channel",
                    self.extension_blocks, context.max_extension_in_blocks
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a refresh: the freshest order state the engine could obtain,
/// and whether it is the cached snapshot rather than a live response
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The order state to display
    pub order: Order,
    /// True when the transport did not answer in time and the engine fell
    /// back to the last persisted snapshot
    pub fetch_old_order: bool,
}

/// Observable engine state, mirrored alongside the typed `Result` returns
/// so a polling view layer can render errors without owning them
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    /// A blocking error occurred
    pub error: bool,
    /// Human-readable message for the last failure
    pub error_msg: Option<String>,
    /// The last refresh hit its deadline; cached-state UX applies
    pub timed_out: bool,
}

/// The order lifecycle engine
#[derive(Clone)]
pub struct OrderService {
    config: Config,
    store: Arc<dyn OrderStore>,
    backend: Arc<dyn NodeBackend>,
    transports: Arc<dyn TransportFactory>,
    status: Arc<RwLock<EngineStatus>>,
}

impl OrderService {
    /// Create an engine over the default transport factory
    pub fn new(config: Config, store: Arc<dyn OrderStore>, backend: Arc<dyn NodeBackend>) -> Self {
        let transports = Arc::new(DefaultTransportFactory::new(
            backend.clone(),
            config.transport.clone(),
        ));
        Self::with_transports(config, store, backend, transports)
    }

    /// Create an engine with a caller-supplied transport factory
    pub fn with_transports(
        config: Config,
        store: Arc<dyn OrderStore>,
        backend: Arc<dyn NodeBackend>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            transports,
            status: Arc::new(RwLock::new(EngineStatus::default())),
        }
    }

    /// Snapshot of the observable engine state
    pub fn status(&self) -> EngineStatus {
        self.status.read().expect("status lock poisoned").clone()
    }

    fn note_success(&self) {
        *self.status.write().expect("status lock poisoned") = EngineStatus::default();
    }

    fn note_failure(&self, e: &OrdersError) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.error = !e.is_timeout();
        status.timed_out = e.is_timeout();
        status.error_msg = Some(e.to_string());
    }

    /// Query an LSP's capabilities and option bounds
    pub async fn get_info(
        &self,
        service: LspsService,
        target: &TransportTarget,
    ) -> OrdersResult<LspInfo> {
        let transport = self.transports.transport(target).await?;
        match transport.get_info(service).await {
            Ok(info) => {
                self.note_success();
                Ok(info)
            }
            Err(e) => {
                error!("get_info failed: {}", e);
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    /// Create a new LSPS1 channel order and append it to the durable log
    pub async fn create_order(&self, params: CreateOrderParams) -> OrdersResult<OrderEnvelope> {
        match self.create_order_inner(params).await {
            Ok(envelope) => {
                self.note_success();
                Ok(envelope)
            }
            Err(e) => {
                error!("create_order failed: {}", e);
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    async fn create_order_inner(&self, params: CreateOrderParams) -> OrdersResult<OrderEnvelope> {
        params.validate()?;

        let transport = self.transports.transport(&params.target).await?;
        let order = transport.create_order(&params.to_request()).await?;

        info!(
            "Order {} created ({} sat LSP balance)",
            order.order_id, order.lsp_balance_sat
        );

        self.append_order(order, params.target, LspsService::Lsps1)
            .await
    }

    /// Create an LSPS7 lease extension order and append it to the durable log
    pub async fn create_extension_order(
        &self,
        params: ExtensionOrderParams,
    ) -> OrdersResult<OrderEnvelope> {
        match self.create_extension_order_inner(params).await {
            Ok(envelope) => {
                self.note_success();
                Ok(envelope)
            }
            Err(e) => {
                error!("create_extension_order failed: {}", e);
                self.note_failure(&e);
                Err(e)
            }
        }
    }

    async fn create_extension_order_inner(
        &self,
        params: ExtensionOrderParams,
    ) -> OrdersResult<OrderEnvelope> {
        params.validate()?;

        let request = ExtensionOrderRequest {
            channel_id: params.channel_id.clone(),
            channel_extension_expiry_blocks: params.extension_blocks,
            token: params.token.clone(),
        };

        let transport = self.transports.transport(&params.target).await?;
        let order = transport.create_extension_order(&request).await?;

        info!(
            "Extension order {} created for channel {}",
            order.order_id, params.channel_id
        );

        self.append_order(order, params.target, LspsService::Lsps7)
            .await
    }

    /// Append an order to the log, skipping when the order id already exists
    async fn append_order(
        &self,
        order: Order,
        target: TransportTarget,
        service: LspsService,
    ) -> OrdersResult<OrderEnvelope> {
        let client_pubkey = self.backend.node_id().await?;

        let envelope = OrderEnvelope {
            order: order.into(),
            client_pubkey,
            target,
            service,
        };

        // fresh read right before the write-back; the store has no
        // transactions, so this shrinks the lost-update window
        let mut entries = log::read_log(&*self.store).await?.unwrap_or_default();
        if log::contains_order(&entries, envelope.order_id()) {
            info!(
                "Order {} already in the log, skipping append",
                envelope.order_id()
            );
            return Ok(envelope);
        }

        entries.push(envelope.clone());
        log::write_log(&*self.store, &entries).await?;

        Ok(envelope)
    }

    /// Refresh an order from the LSP it was created on.
    ///
    /// Falls back to the last persisted snapshot when the transport errors
    /// or does not answer within the configured deadline; in the timeout
    /// case the request is left running and a late response is still merged
    /// through the reconciliation rule.
    ///
    /// `order_should_update` forces the durable merge even when the fresh
    /// state would normally be discarded (e.g. it is not terminal, or the
    /// local record already is).
    pub async fn refresh_order(
        &self,
        order_id: &str,
        order_should_update: bool,
    ) -> OrdersResult<RefreshOutcome> {
        let entries = log::read_log(&*self.store).await?.unwrap_or_default();
        let envelope = entries
            .iter()
            .find(|e| e.order_id() == order_id)
            .cloned()
            .ok_or_else(|| OrdersError::NotFound(order_id.to_string()))?;

        let cached = envelope.order.order().clone();
        let transport = self.transports.transport(&envelope.target).await?;

        let service = envelope.service;
        let id = order_id.to_string();
        let mut request = tokio::spawn(async move { transport.get_order(service, &id).await });

        let deadline = Duration::from_millis(self.config.engine.refresh_timeout_ms);
        match timeout(deadline, &mut request).await {
            Ok(Ok(Ok(fresh))) => {
                let order = self
                    .reconcile(order_id, fresh, order_should_update)
                    .await?;
                self.note_success();
                Ok(RefreshOutcome {
                    order,
                    fetch_old_order: false,
                })
            }
            Ok(Ok(Err(e))) => {
                warn!(
                    "Refresh of order {} failed ({}), showing previous state",
                    order_id, e
                );
                self.note_failure(&e);
                Ok(RefreshOutcome {
                    order: cached,
                    fetch_old_order: true,
                })
            }
            Ok(Err(join_err)) => {
                let e = OrdersError::Transport(format!("Refresh task failed: {}", join_err));
                self.note_failure(&e);
                Ok(RefreshOutcome {
                    order: cached,
                    fetch_old_order: true,
                })
            }
            Err(_) => {
                let e = OrdersError::Timeout(format!(
                    "Order {} refresh did not resolve within {}ms",
                    order_id, self.config.engine.refresh_timeout_ms
                ));
                warn!("{}, showing previous state", e);
                self.note_failure(&e);

                // keep the request alive; a late response still settles
                // through the same reconciliation rule
                let engine = self.clone();
                let id = order_id.to_string();
                tokio::spawn(async move {
                    if let Ok(Ok(fresh)) = request.await {
                        debug!("Late refresh response for order {}, reconciling", id);
                        if let Err(e) = engine.reconcile(&id, fresh, order_should_update).await {
                            warn!("Failed to reconcile late response for {}: {}", id, e);
                        }
                    }
                });

                Ok(RefreshOutcome {
                    order: cached,
                    fetch_old_order: true,
                })
            }
        }
    }

    /// Merge a freshly fetched order state into the durable log.
    ///
    /// The durable merge happens only when the caller forced it, or when
    /// the fresh state is terminal and the local record is not: CREATED
    /// refreshes are transient and must not be persisted as if final, and a
    /// stale poll must never overwrite a locally terminal order.
    async fn reconcile(
        &self,
        order_id: &str,
        fresh: Order,
        order_should_update: bool,
    ) -> OrdersResult<Order> {
        // re-read the log right before the write to tolerate appends that
        // happened while the refresh was in flight
        let mut entries = log::read_log(&*self.store).await?.unwrap_or_default();
        let Some(envelope) = log::find_envelope(&mut entries, order_id) else {
            warn!("Order {} vanished from the log, not persisting", order_id);
            return Ok(fresh);
        };

        let local_terminal = envelope.order.order().order_state.is_terminal();
        let fresh_terminal = fresh.order_state.is_terminal();

        if order_should_update || (fresh_terminal && !local_terminal) {
            info!(
                "Persisting order {} state {} (was {})",
                order_id,
                fresh.order_state,
                envelope.order.order().order_state
            );
            envelope.replace_order(fresh.clone());
            log::write_log(&*self.store, &entries).await?;
        } else if fresh_terminal && local_terminal {
            debug!(
                "Order {} already terminal locally, skipping re-persist",
                order_id
            );
        } else {
            debug!(
                "Order {} refresh is non-terminal ({}), in-memory only",
                order_id, fresh.order_state
            );
        }

        Ok(fresh)
    }

    /// Project the display list of orders for the active node identity.
    ///
    /// `None` is the "no orders yet" condition: nothing persisted, or an
    /// unreadable log (logged and degraded rather than surfaced as an
    /// error).
    pub async fn list_orders(&self) -> Option<Vec<OrderSummary>> {
        let node_id = match self.backend.node_id().await {
            Ok(node_id) => node_id,
            Err(e) => {
                error!("Cannot resolve node identity for order list: {}", e);
                return None;
            }
        };

        match log::read_log(&*self.store).await {
            Ok(Some(entries)) if !entries.is_empty() => {
                Some(project_summaries(&entries, &node_id))
            }
            Ok(_) => None,
            Err(e) => {
                error!("Order log unreadable, treating as no orders: {}", e);
                None
            }
        }
    }
}
