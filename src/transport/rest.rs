//! REST transport
//!
//! Plain request/response against an LSP's configured base URL. LSPS1
//! operations live under `/api/v1/`, LSPS7 ones under `/api/v1/lsps7/`,
//! mirroring the `lsps1.*`/`lsps7.*` namespacing of the JSON-RPC methods.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::model::{
    CreateOrderRequest, ExtensionOrderRequest, LspInfo, LspsService, Order, TransportTarget,
};
use crate::transport::{decode_order, unwrap_result, LspsTransport};
use crate::{OrdersError, OrdersResult};

/// REST implementation of the LSPS transport
#[derive(Debug, Clone)]
pub struct RestTransport {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL of the LSP's HTTP API
    base_url: String,
    /// Per-request timeout
    timeout: Duration,
}

impl RestTransport {
    /// Create a transport for the given base URL
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn url(&self, service: LspsService, op: &str) -> String {
        match service {
            LspsService::Lsps1 => format!("{}/api/v1/{}", self.base_url, op),
            LspsService::Lsps7 => format!("{}/api/v1/lsps7/{}", self.base_url, op),
        }
    }

    async fn decode_response(response: reqwest::Response) -> OrdersResult<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("LSP returned error: {} - {}", status, text);
            return Err(OrdersError::Transport(format!(
                "LSP returned error: {} - {}",
                status, text
            )));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse LSP response: {}", e);
            OrdersError::Transport(format!("Failed to parse LSP response: {}", e))
        })
    }

    fn map_request_error(e: reqwest::Error) -> OrdersError {
        if e.is_timeout() {
            OrdersError::Timeout(format!("LSP request timed out: {}", e))
        } else {
            OrdersError::Transport(format!("LSP request failed: {}", e))
        }
    }
}

#[async_trait]
impl LspsTransport for RestTransport {
    async fn get_info(&self, service: LspsService) -> OrdersResult<LspInfo> {
        let url = self.url(service, "get_info");
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let value = unwrap_result(Self::decode_response(response).await?);
        serde_json::from_value(value)
            .map_err(|e| OrdersError::Transport(format!("Malformed get_info response: {}", e)))
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> OrdersResult<Order> {
        let url = self.url(LspsService::Lsps1, "create_order");
        debug!("POST {} (lsp_balance_sat={})", url, request.lsp_balance_sat);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        decode_order(Self::decode_response(response).await?)
    }

    async fn create_extension_order(&self, request: &ExtensionOrderRequest) -> OrdersResult<Order> {
        let url = self.url(LspsService::Lsps7, "create_order");
        debug!("POST {} (channel_id={})", url, request.channel_id);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        decode_order(Self::decode_response(response).await?)
    }

    async fn get_order(&self, service: LspsService, order_id: &str) -> OrdersResult<Order> {
        let url = self.url(service, "get_order");
        debug!("GET {} (order_id={})", url, order_id);

        let response = self
            .client
            .get(&url)
            .query(&[("order_id", order_id)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        decode_order(Self::decode_response(response).await?)
    }

    fn target(&self) -> TransportTarget {
        TransportTarget::Rest {
            endpoint: self.base_url.clone(),
        }
    }
}
