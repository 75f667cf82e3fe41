//! Order list projection
//!
//! Derives the display list from the raw append log: only envelopes stamped
//! with the active node identity are visible (orders created under another
//! wallet profile never leak across), and the list is newest-first by
//! reversing insertion order, which is trusted as chronological.

use tracing::debug;

use crate::model::{OrderEnvelope, OrderSummary};

/// Project display summaries for the given node identity, newest first
pub fn project_summaries(entries: &[OrderEnvelope], node_id: &str) -> Vec<OrderSummary> {
    let mut summaries: Vec<OrderSummary> = entries
        .iter()
        .filter(|envelope| envelope.client_pubkey == node_id)
        .map(summarize)
        .collect();

    debug!(
        "Projected {} of {} orders for node {}",
        summaries.len(),
        entries.len(),
        node_id
    );

    summaries.reverse();
    summaries
}

fn summarize(envelope: &OrderEnvelope) -> OrderSummary {
    let order = envelope.order.order();
    OrderSummary {
        order_id: order.order_id.clone(),
        state: order.order_state,
        created_at: order.created_at,
        funded_at: order.channel.as_ref().and_then(|c| c.funded_at),
        lsp_balance_sat: order.lsp_balance_sat.clone(),
        service: envelope.service,
    }
}
