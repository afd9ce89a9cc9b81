//! Model Context Protocol entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by an MCP server.
///
/// The wire field for the schema is `inputSchema`; `parameters` is accepted
/// as an alias so hand-written fixtures stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", alias = "parameters", default)]
    pub parameters: Value,
}

/// One content block of a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

/// Typed result of a `tools/call`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl McpToolResult {
    /// Concatenate the text blocks of the result.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Typed arguments of a `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolParams {
    pub arguments: Value,
}

/// What one server reported during the handshake, plus its discovered tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
}

/// A discovered tool annotated with the server that advertised it.
#[derive(Debug, Clone)]
pub struct McpToolOrigin {
    pub tool: McpToolDefinition,
    pub server_url: String,
}
