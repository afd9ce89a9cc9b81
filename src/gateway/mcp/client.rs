//! JSON-RPC client for MCP tool servers.
//!
//! Startup flow: [`McpClient::initialize_all`] performs the handshake
//! against every configured server, then [`McpClient::discover_capabilities`]
//! fetches each server's tool list.  After that the capability map is
//! frozen; request handling only reads it, so the client can be shared
//! behind an `Arc` without locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::gateway::a2a::types::{JsonRpcRequest, JsonRpcResponse};
use crate::gateway::error::GatewayError;
use crate::gateway::http::shared_http_client;
use crate::gateway::mcp::types::{
    McpToolDefinition, McpToolOrigin, McpToolParams, McpToolResult, ServerCapabilities,
};

/// Protocol revision sent during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// HTTP JSON-RPC client spanning every configured MCP server.
pub struct McpClient {
    http: reqwest::Client,
    timeout: Duration,
    servers: Vec<String>,
    next_id: AtomicU64,
    capabilities: HashMap<String, ServerCapabilities>,
}

impl McpClient {
    pub fn new(servers: Vec<String>, timeout: Duration) -> Self {
        Self {
            http: shared_http_client().clone(),
            timeout,
            servers,
            next_id: AtomicU64::new(1),
            capabilities: HashMap::new(),
        }
    }

    /// Swap the HTTP client (tests point this at local mock servers).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Handshake against every configured server.
    ///
    /// Unreachable servers are logged and skipped; the returned count says
    /// how many registered successfully.
    pub async fn initialize_all(&mut self, cancel: &CancellationToken) -> usize {
        let servers = self.servers.clone();
        let mut initialized = 0;
        for url in servers {
            match self.initialize(cancel, &url).await {
                Ok(capabilities) => {
                    log::info!(
                        "MCP server {} registered: {} v{}",
                        url,
                        capabilities.name,
                        capabilities.version
                    );
                    self.capabilities.insert(url, capabilities);
                    initialized += 1;
                }
                Err(err) => {
                    log::warn!("MCP server {} failed to initialize: {}", url, err);
                }
            }
        }
        initialized
    }

    async fn initialize(
        &self,
        cancel: &CancellationToken,
        server_url: &str,
    ) -> Result<ServerCapabilities, GatewayError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let result = self.rpc(cancel, server_url, "initialize", params).await?;
        let info = result.get("serverInfo").cloned().unwrap_or_default();
        Ok(ServerCapabilities {
            name: info
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            version: info
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or("0.0.0")
                .to_string(),
            tools: Vec::new(),
        })
    }

    /// `tools/list` against every initialized server; the merged list is
    /// annotated with each tool's origin URL and cached in the capability
    /// map.
    pub async fn discover_capabilities(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<McpToolOrigin>, GatewayError> {
        let urls: Vec<String> = self.capabilities.keys().cloned().collect();
        let mut merged = Vec::new();
        for url in urls {
            let result = self.rpc(cancel, &url, "tools/list", json!({})).await?;
            let tools: Vec<McpToolDefinition> = result
                .get("tools")
                .map(|t| serde_json::from_value(t.clone()))
                .transpose()?
                .unwrap_or_default();
            for tool in &tools {
                merged.push(McpToolOrigin {
                    tool: tool.clone(),
                    server_url: url.clone(),
                });
            }
            if let Some(capabilities) = self.capabilities.get_mut(&url) {
                capabilities.tools = tools;
            }
        }
        Ok(merged)
    }

    /// Read-only view of the frozen capability map, keyed by server URL.
    pub fn capabilities(&self) -> &HashMap<String, ServerCapabilities> {
        &self.capabilities
    }

    /// Every discovered tool with its origin.
    pub fn tools(&self) -> Vec<McpToolOrigin> {
        self.capabilities
            .iter()
            .flat_map(|(url, capabilities)| {
                capabilities.tools.iter().map(move |tool| McpToolOrigin {
                    tool: tool.clone(),
                    server_url: url.clone(),
                })
            })
            .collect()
    }

    /// The server that advertised `tool_name`, if any.
    pub fn origin_of(&self, tool_name: &str) -> Option<&str> {
        self.capabilities
            .iter()
            .find(|(_, capabilities)| capabilities.tools.iter().any(|t| t.name == tool_name))
            .map(|(url, _)| url.as_str())
    }

    /// `tools/call` on a specific server.
    pub async fn execute_tool(
        &self,
        cancel: &CancellationToken,
        name: &str,
        params: McpToolParams,
        server_url: &str,
    ) -> Result<McpToolResult, GatewayError> {
        let result = self
            .rpc(
                cancel,
                server_url,
                "tools/call",
                json!({ "name": name, "arguments": params.arguments }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `prompts/get` on a specific server.
    pub async fn get_prompt(
        &self,
        cancel: &CancellationToken,
        name: &str,
        arguments: Value,
        server_url: &str,
    ) -> Result<Value, GatewayError> {
        self.rpc(
            cancel,
            server_url,
            "prompts/get",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    async fn rpc(
        &self,
        cancel: &CancellationToken,
        server_url: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = JsonRpcRequest::new(id, method, params);

        let request = self.http.post(server_url).json(&envelope).timeout(self.timeout);
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

        let rpc: JsonRpcResponse = response.json().await.map_err(|e| {
            GatewayError::Decode(format!("JSON-RPC response from {}: {}", server_url, e))
        })?;
        if rpc.id.as_ref().and_then(|v| v.as_u64()) != Some(id) {
            log::warn!(
                "{}: JSON-RPC response id does not match request id {}",
                server_url,
                id
            );
        }
        if let Some(error) = rpc.error {
            return Err(GatewayError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }
        rpc.result.ok_or_else(|| {
            GatewayError::Decode(format!(
                "JSON-RPC response from {} had neither result nor error",
                server_url
            ))
        })
    }
}
