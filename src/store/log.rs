//! Order log codec
//!
//! The order log is one value under [`ORDERS_STORE_KEY`](super::ORDERS_STORE_KEY).
//! The canonical encoding is a single JSON array of envelope objects, but
//! earlier writers produced other wrappings that must still be readable:
//!
//! - an array of per-envelope JSON *strings* (each envelope serialized
//!   separately, then collected)
//! - a single envelope object (from before the log was an array)
//! - any of the above JSON-encoded a second time by an inconsistent caller
//!
//! All reads funnel through [`decode_log`]; all writes through
//! [`encode_log`], which emits only the canonical shape.

use serde_json::Value;
use tracing::debug;

use crate::model::OrderEnvelope;
use crate::store::{OrderStore, ORDERS_STORE_KEY};
use crate::{OrdersError, OrdersResult};

/// Decode a persisted order log value, whatever generation wrote it
pub fn decode_log(raw: &str) -> OrdersResult<Vec<OrderEnvelope>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| OrdersError::Persistence(format!("Malformed order log: {}", e)))?;
    decode_value(value, true)
}

fn decode_value(value: Value, allow_unwrap: bool) -> OrdersResult<Vec<OrderEnvelope>> {
    match value {
        // a caller double-encoded the log; unwrap one level only
        Value::String(inner) if allow_unwrap => {
            debug!("Order log was double-encoded, unwrapping");
            let value: Value = serde_json::from_str(&inner).map_err(|e| {
                OrdersError::Persistence(format!("Malformed double-encoded order log: {}", e))
            })?;
            decode_value(value, false)
        }
        Value::Array(items) => items.into_iter().map(decode_envelope).collect(),
        Value::Object(_) => Ok(vec![envelope_from_value(value)?]),
        other => Err(OrdersError::Persistence(format!(
            "Unexpected order log shape: {}",
            type_name(&other)
        ))),
    }
}

fn decode_envelope(item: Value) -> OrdersResult<OrderEnvelope> {
    match item {
        // older writers serialized each envelope separately
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| OrdersError::Persistence(format!("Malformed order envelope: {}", e))),
        other => envelope_from_value(other),
    }
}

fn envelope_from_value(value: Value) -> OrdersResult<OrderEnvelope> {
    serde_json::from_value(value)
        .map_err(|e| OrdersError::Persistence(format!("Malformed order envelope: {}", e)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode the order log in the canonical shape
pub fn encode_log(envelopes: &[OrderEnvelope]) -> OrdersResult<String> {
    serde_json::to_string(envelopes)
        .map_err(|e| OrdersError::Persistence(format!("Failed to encode order log: {}", e)))
}

/// Read and decode the full log; `None` when nothing has been stored yet
pub async fn read_log(store: &dyn OrderStore) -> OrdersResult<Option<Vec<OrderEnvelope>>> {
    match store.get_item(ORDERS_STORE_KEY).await? {
        Some(raw) => Ok(Some(decode_log(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write back the full log
pub async fn write_log(store: &dyn OrderStore, envelopes: &[OrderEnvelope]) -> OrdersResult<()> {
    let encoded = encode_log(envelopes)?;
    store.set_item(ORDERS_STORE_KEY, &encoded).await
}

/// Locate an envelope by unwrapped order id.
///
/// Lookup is by value, never by array index, so a concurrent append between
/// a read and a write cannot redirect a merge to the wrong record.
pub fn find_envelope<'a>(
    log: &'a mut [OrderEnvelope],
    order_id: &str,
) -> Option<&'a mut OrderEnvelope> {
    log.iter_mut().find(|e| e.order_id() == order_id)
}

/// Whether the log already contains an envelope for this order id
pub fn contains_order(log: &[OrderEnvelope], order_id: &str) -> bool {
    log.iter().any(|e| e.order_id() == order_id)
}
