//! Payment dispatch resolution
//!
//! An order's payment payload may offer Lightning, on-chain, or both. The
//! resolver normalizes whichever wire generation the LSP spoke and surfaces
//! one action per available method; it never auto-picks when both exist.
//! Note that the payment carries its own state, separate from the order
//! state: a payment can be pending while the order remains CREATED.

use tracing::debug;

use crate::backend::{DecodedInvoice, NodeBackend};
use crate::model::Order;
use crate::{OrdersError, OrdersResult};

/// A payment method the wallet can offer for an order
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentAction {
    /// Pay the order's BOLT11 invoice over Lightning
    Lightning {
        /// Invoice to decode and pay
        invoice: String,
        /// Total amount due over this method (sat, string-encoded)
        order_total_sat: Option<String>,
        /// LSP fee portion (sat, string-encoded)
        fee_total_sat: Option<String>,
        /// State of this payment method (not the order state)
        payment_state: Option<String>,
        /// True when no other method is available; drives the label
        sole_option: bool,
    },
    /// Pay the order on-chain
    Onchain {
        /// Destination address
        address: String,
        /// Total amount due over this method (sat, string-encoded)
        order_total_sat: Option<String>,
        /// LSP fee portion (sat, string-encoded)
        fee_total_sat: Option<String>,
        /// Minimum confirmations for the payment to count
        min_onchain_payment_confirmations: Option<u32>,
        /// Minimum fee rate for a zero-conf open
        min_fee_for_0conf: Option<u64>,
        /// State of this payment method (not the order state)
        payment_state: Option<String>,
        /// True when no other method is available; drives the label
        sole_option: bool,
    },
}

impl PaymentAction {
    /// The button label for this action.
    ///
    /// Method-specific wording is only needed when the user actually has a
    /// choice; a lone method is just "Make Payment".
    pub fn label(&self) -> &'static str {
        match self {
            PaymentAction::Lightning { sole_option: true, .. }
            | PaymentAction::Onchain { sole_option: true, .. } => "Make Payment",
            PaymentAction::Lightning { .. } => "Pay via Lightning",
            PaymentAction::Onchain { .. } => "Pay On-chain",
        }
    }
}

/// Determine the payment actions available for an order
pub fn resolve_payment_actions(order: &Order) -> Vec<PaymentAction> {
    let Some(payment) = &order.payment else {
        debug!("Order {} carries no payment payload", order.order_id);
        return Vec::new();
    };

    let info = payment.normalize();
    let sole_option = !(info.bolt11.is_some() && info.onchain.is_some());

    let mut actions = Vec::new();

    if let Some(bolt11) = info.bolt11 {
        actions.push(PaymentAction::Lightning {
            invoice: bolt11.invoice,
            order_total_sat: bolt11.order_total_sat,
            fee_total_sat: bolt11.fee_total_sat,
            payment_state: bolt11.state,
            sole_option,
        });
    }

    if let Some(onchain) = info.onchain {
        actions.push(PaymentAction::Onchain {
            address: onchain.address,
            order_total_sat: onchain.order_total_sat,
            fee_total_sat: onchain.fee_total_sat,
            min_onchain_payment_confirmations: onchain.min_onchain_payment_confirmations,
            min_fee_for_0conf: onchain.min_fee_for_0conf,
            payment_state: info.state.clone(),
            sole_option,
        });
    }

    actions
}

/// Decode a Lightning action's invoice ahead of the pay-confirmation screen
pub async fn prepare_lightning(
    action: &PaymentAction,
    backend: &dyn NodeBackend,
) -> OrdersResult<DecodedInvoice> {
    match action {
        PaymentAction::Lightning { invoice, .. } => {
            backend.decode_payment_request(invoice).await
        }
        PaymentAction::Onchain { .. } => Err(OrdersError::Validation(
            "Not a Lightning payment action".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderState;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    fn order_with_payment(payment: serde_json::Value) -> Order {
        serde_json::from_value(serde_json::json!({
            "order_id": "abc",
            "order_state": "CREATED",
            "lsp_balance_sat": "500000",
            "client_balance_sat": "0",
            "announce_channel": false,
            "payment": payment
        }))
        .unwrap()
    }

    #[test]
    fn test_dual_methods_surface_two_actions() {
        let order = order_with_payment(serde_json::json!({
            "bolt11": {"invoice": "lnbc1both", "order_total_sat": "501000"},
            "onchain": {"address": "bc1qboth", "fee_total_sat": "1200"}
        }));

        let actions = resolve_payment_actions(&order);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].label(), "Pay via Lightning");
        assert_eq!(actions[1].label(), "Pay On-chain");
    }

    #[test]
    fn test_single_method_is_plain_make_payment() {
        let order = order_with_payment(serde_json::json!({
            "bolt11": {"invoice": "lnbc1only"}
        }));

        let actions = resolve_payment_actions(&order);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].label(), "Make Payment");
    }

    #[test]
    fn test_legacy_and_nested_resolve_to_same_shape() {
        let legacy = order_with_payment(serde_json::json!({
            "lightning_invoice": "lnbc1same",
            "fee_total_sat": "1000",
            "order_total_sat": "501000"
        }));
        let nested = order_with_payment(serde_json::json!({
            "bolt11": {
                "invoice": "lnbc1same",
                "fee_total_sat": "1000",
                "order_total_sat": "501000"
            }
        }));

        let legacy_actions = resolve_payment_actions(&legacy);
        let nested_actions = resolve_payment_actions(&nested);
        assert_eq!(legacy_actions, nested_actions);
    }

    #[test]
    fn test_legacy_onchain_address_is_enough() {
        let order = order_with_payment(serde_json::json!({
            "onchain_address": "bc1qlegacy"
        }));

        let actions = resolve_payment_actions(&order);
        assert!(matches!(
            actions.as_slice(),
            [PaymentAction::Onchain { sole_option: true, .. }]
        ));
    }

    #[test]
    fn test_no_payment_payload_yields_no_actions() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "order_id": "abc",
            "order_state": "CREATED",
            "lsp_balance_sat": "500000",
            "client_balance_sat": "0",
            "announce_channel": false
        }))
        .unwrap();

        assert!(resolve_payment_actions(&order).is_empty());
        assert_eq!(order.order_state, OrderState::Created);
    }

    #[test]
    fn test_payment_state_not_conflated_with_order_state() {
        // payment pending while the order remains CREATED
        let order = order_with_payment(serde_json::json!({
            "bolt11": {"invoice": "lnbc1pending", "state": "HOLD"}
        }));

        let actions = resolve_payment_actions(&order);
        match &actions[0] {
            PaymentAction::Lightning { payment_state, .. } => {
                assert_eq!(payment_state.as_deref(), Some("HOLD"));
            }
            other => panic!("expected a lightning action, got {:?}", other),
        }
        assert_eq!(order.order_state, OrderState::Created);
    }

    struct DecodingBackend;

    #[async_trait]
    impl NodeBackend for DecodingBackend {
        fn supports_lsps1_rest(&self) -> bool {
            true
        }
        fn supports_lsps_custom_message(&self) -> bool {
            false
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
        fn subscribe_custom_messages(&self) -> broadcast::Receiver<crate::backend::CustomMessage> {
            broadcast::channel(1).0.subscribe()
        }
        async fn decode_payment_request(&self, invoice: &str) -> OrdersResult<DecodedInvoice> {
            Ok(DecodedInvoice {
                payment_hash: format!("hash-of-{}", invoice),
                amount_msat: Some(501_000_000),
                expiry_secs: 3600,
            })
        }
    }

    #[tokio::test]
    async fn test_prepare_lightning_decodes_via_backend() {
        let order = order_with_payment(serde_json::json!({
            "bolt11": {"invoice": "lnbc1decode"}
        }));
        let actions = resolve_payment_actions(&order);

        let decoded = prepare_lightning(&actions[0], &DecodingBackend).await.unwrap();
        assert_eq!(decoded.payment_hash, "hash-of-lnbc1decode");
    }

    #[tokio::test]
    async fn test_prepare_lightning_rejects_onchain_action() {
        let order = order_with_payment(serde_json::json!({
            "onchain_address": "bc1qlegacy"
        }));
        let actions = resolve_payment_actions(&order);

        let outcome = prepare_lightning(&actions[0], &DecodingBackend).await;
        assert!(matches!(outcome, Err(OrdersError::Validation(_))));
    }
}
