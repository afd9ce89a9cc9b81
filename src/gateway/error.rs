//! Gateway error taxonomy.
//!
//! Failures are grouped by what the caller can do about them: transport
//! problems, upstream protocol violations, bad configuration, and streaming
//! faults.  Recoverable tool-call failures never appear here; the agent
//! loops fold those into the conversation as tool-role messages instead.

use std::error::Error;
use std::fmt;

/// Classified failure raised by gateway components.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Connection, DNS, TLS, or timeout failure before a response arrived.
    Network(String),
    /// Upstream answered with a non-2xx status; the body is kept verbatim.
    HttpStatus { status: u16, body: String },
    /// Upstream rejected our credentials (401/403).
    Auth { status: u16, body: String },
    /// Response body could not be parsed into the expected shape.
    Decode(String),
    /// Missing or invalid configuration; fatal at the request boundary.
    Config(String),
    /// JSON-RPC error envelope from an A2A agent or MCP server.
    JsonRpc { code: i64, message: String },
    /// Streaming transport fault after the stream was established.
    Stream(String),
}

impl GatewayError {
    /// Classify a non-2xx response, separating auth failures from the rest.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 401 || status == 403 {
            GatewayError::Auth { status, body }
        } else {
            GatewayError::HttpStatus { status, body }
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Network(msg) => write!(f, "network error: {}", msg),
            GatewayError::HttpStatus { status, body } => {
                write!(f, "upstream returned HTTP {}: {}", status, body)
            }
            GatewayError::Auth { status, body } => {
                write!(f, "upstream rejected credentials (HTTP {}): {}", status, body)
            }
            GatewayError::Decode(msg) => write!(f, "decode error: {}", msg),
            GatewayError::Config(msg) => write!(f, "configuration error: {}", msg),
            GatewayError::JsonRpc { code, message } => {
                write!(f, "JSON-RPC error {}: {}", code, message)
            }
            GatewayError::Stream(msg) => write!(f, "stream error: {}", msg),
        }
    }
}

impl Error for GatewayError {}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}
