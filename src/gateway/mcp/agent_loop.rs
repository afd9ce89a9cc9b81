//! MCP agent loop.
//!
//! Same iteration and assembly discipline as the A2A loop, with one
//! difference: the tools offered to the model are whatever the configured
//! MCP servers advertised, and each call is dispatched to the server that
//! advertised it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::engine::{tool_error_message, unknown_tool_message, AgentEngine, ToolDispatcher};
use crate::gateway::error::GatewayError;
use crate::gateway::mcp::client::McpClient;
use crate::gateway::mcp::types::McpToolParams;
use crate::gateway::providers::client::ChatClient;
use crate::gateway::schema::{
    ChatCompletionRequest, ChatCompletionResponse, Message, Tool, ToolCall,
};

/// The MCP tool-calling engine.
pub struct McpAgentLoop {
    engine: AgentEngine,
    dispatcher: McpDispatcher,
}

impl McpAgentLoop {
    /// The client must have been initialized (handshake + discovery) before
    /// it is handed over; the loop treats its capability map as frozen.
    pub fn new(chat: Arc<dyn ChatClient>, mcp: Arc<McpClient>, max_iterations: u32) -> Self {
        Self {
            engine: AgentEngine::new(chat, max_iterations),
            dispatcher: McpDispatcher { mcp },
        }
    }

    /// Append every discovered MCP tool to the request, skipping names the
    /// request already carries.
    pub fn inject_tools(&self, req: &mut ChatCompletionRequest) {
        let tools = req.tools.get_or_insert_with(Vec::new);
        for origin in self.dispatcher.mcp.tools() {
            if !tools.iter().any(|t| t.function.name == origin.tool.name) {
                tools.push(Tool::function(
                    origin.tool.name,
                    origin.tool.description,
                    origin.tool.parameters,
                ));
            }
        }
    }

    /// Non-streaming loop; see [`AgentEngine::run`].
    pub async fn run_with_tools(
        &self,
        cancel: &CancellationToken,
        req: &mut ChatCompletionRequest,
        resp: &mut ChatCompletionResponse,
    ) -> Result<(), GatewayError> {
        self.engine.run(cancel, &self.dispatcher, req, resp).await
    }

    /// Streaming loop; see [`AgentEngine::run_with_stream`].
    pub async fn stream_chat_with_tools(
        &self,
        cancel: &CancellationToken,
        out: &mpsc::Sender<String>,
        req: &mut ChatCompletionRequest,
    ) -> Result<(), GatewayError> {
        self.engine
            .run_with_stream(cancel, &self.dispatcher, out, req)
            .await
    }
}

struct McpDispatcher {
    mcp: Arc<McpClient>,
}

#[async_trait]
impl ToolDispatcher for McpDispatcher {
    async fn dispatch(&self, cancel: &CancellationToken, call: &ToolCall) -> Message {
        let name = call.function.name.as_str();
        let Some(server_url) = self.mcp.origin_of(name).map(|s| s.to_string()) else {
            return unknown_tool_message(call);
        };

        let arguments: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(value) => value,
            Err(err) => return tool_error_message(call, err),
        };

        match self
            .mcp
            .execute_tool(cancel, name, McpToolParams { arguments }, &server_url)
            .await
        {
            Ok(result) => Message::tool_result(&call.id, result.text()),
            Err(err) => tool_error_message(call, err),
        }
    }
}
