//! JSON-RPC 2.0 client for remote A2A agents.
//!
//! Two operations: fetch an agent's card from its well-known location, and
//! submit a `message/send` call to its `/a2a` endpoint.  Request ids are
//! monotonic per client.  Transport failures are surfaced as-is; whether to
//! retry is the agent loop's decision, not this layer's.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::gateway::a2a::types::{AgentCard, JsonRpcRequest, JsonRpcResponse, MessageSendParams};
use crate::gateway::error::GatewayError;
use crate::gateway::http::shared_http_client;

/// Well-known path serving the agent card.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

/// JSON-RPC endpoint path on every A2A agent.
pub const A2A_PATH: &str = "/a2a";

/// HTTP client for the A2A protocol.
pub struct A2aClient {
    http: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl A2aClient {
    /// `timeout` bounds each outbound call independently of the caller's
    /// cancellation token.
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: shared_http_client().clone(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Swap the HTTP client (tests point this at local mock agents).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Fetch and parse `<agent_url>/.well-known/agent.json`.
    pub async fn get_agent_card(
        &self,
        cancel: &CancellationToken,
        agent_url: &str,
    ) -> Result<AgentCard, GatewayError> {
        let url = format!("{}{}", agent_url.trim_end_matches('/'), AGENT_CARD_PATH);
        let request = self.http.get(&url).timeout(self.timeout);
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Network("request canceled".to_string()));
            }
            result = request.send() => result?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }
        let card = response
            .json::<AgentCard>()
            .await
            .map_err(|e| GatewayError::Decode(format!("agent card from {}: {}", url, e)))?;
        Ok(card)
    }

    /// POST a `message/send` call and return the JSON-RPC `result` payload.
    pub async fn send_message(
        &self,
        cancel: &CancellationToken,
        params: MessageSendParams,
        agent_url: &str,
    ) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = JsonRpcRequest::new(id, "message/send", serde_json::to_value(&params)?);
        let url = format!("{}{}", agent_url.trim_end_matches('/'), A2A_PATH);

        let request = self.http.post(&url).json(&envelope).timeout(self.timeout);
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Network("request canceled".to_string()));
            }
            result = request.send() => result?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("JSON-RPC response from {}: {}", url, e)))?;
        if rpc.id.as_ref().and_then(|v| v.as_u64()) != Some(id) {
            log::warn!("{}: JSON-RPC response id does not match request id {}", url, id);
        }
        if let Some(error) = rpc.error {
            return Err(GatewayError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }
        rpc.result
            .ok_or_else(|| GatewayError::Decode(format!("JSON-RPC response from {} had neither result nor error", url)))
    }
}
