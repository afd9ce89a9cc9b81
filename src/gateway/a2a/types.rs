//! Agent-to-Agent protocol entities.
//!
//! Remote agents describe themselves through an [`AgentCard`] published at
//! `/.well-known/agent.json` and accept work through JSON-RPC 2.0
//! `message/send` calls.  Long-running work is represented as a [`Task`]
//! whose status advances `submitted → working → completed | failed |
//! canceled`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a remote agent can do on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

/// One advertised skill of a remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_modes: Vec<String>,
    #[serde(default)]
    pub output_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Self-description document served at `/.well-known/agent.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

/// One part of an A2A message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

/// A message exchanged with a remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    pub kind: String,
    pub message_id: String,
    pub role: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl A2aMessage {
    /// Build a user-role message with a single text part.
    pub fn user_text(text: impl Into<String>, metadata: Option<Value>) -> Self {
        Self {
            kind: "message".to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            role: "user".to_string(),
            parts: vec![Part::Text { text: text.into() }],
            metadata,
        }
    }

    /// The first text part, if the message has one.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Lifecycle state of an A2A task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Whether the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Canceled)
    }
}

/// Status snapshot attached to a [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<A2aMessage>,
    pub timestamp: String,
}

/// A unit of remote work tracked by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub kind: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<A2aMessage>>,
}

/// Parameters of a `message/send` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: A2aMessage,
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC 2.0 response envelope (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Pull the reply text out of a `message/send` result, which may be a bare
/// message or a task whose status carries one.
pub fn result_text(result: &Value) -> Option<String> {
    let message = match result.get("kind").and_then(|k| k.as_str()) {
        Some("message") => serde_json::from_value::<A2aMessage>(result.clone()).ok(),
        Some("task") => serde_json::from_value::<Task>(result.clone())
            .ok()
            .and_then(|task| task.status.message),
        _ => result
            .get("message")
            .and_then(|m| serde_json::from_value::<A2aMessage>(m.clone()).ok()),
    };
    message
        .as_ref()
        .and_then(|m| m.first_text())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_card_parses_camel_case_fields() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "calculator",
            "description": "Does arithmetic",
            "url": "http://calc:8080",
            "version": "1.0.0",
            "capabilities": {"streaming": true, "pushNotifications": false},
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "skills": [{
                "id": "add",
                "name": "Addition",
                "description": "Adds numbers",
                "inputModes": ["text"],
                "outputModes": ["text"],
                "examples": ["add 2 and 3"],
                "tags": ["math"]
            }]
        }))
        .unwrap();
        assert!(card.capabilities.streaming);
        assert_eq!(card.skills[0].id, "add");
        assert_eq!(card.skills[0].examples.as_ref().unwrap()[0], "add 2 and 3");
    }

    #[test]
    fn message_text_extraction_skips_data_parts() {
        let msg = A2aMessage {
            kind: "message".to_string(),
            message_id: "m1".to_string(),
            role: "agent".to_string(),
            parts: vec![
                Part::Data { data: json!({"x": 1}) },
                Part::Text { text: "five".to_string() },
            ],
            metadata: None,
        };
        assert_eq!(msg.first_text(), Some("five"));
    }

    #[test]
    fn result_text_handles_message_and_task_shapes() {
        let message = json!({
            "kind": "message",
            "messageId": "m1",
            "role": "agent",
            "parts": [{"kind": "text", "text": "the answer"}]
        });
        assert_eq!(result_text(&message).as_deref(), Some("the answer"));

        let task = json!({
            "kind": "task",
            "id": "t1",
            "contextId": "c1",
            "status": {
                "state": "completed",
                "message": {
                    "kind": "message",
                    "messageId": "m2",
                    "role": "agent",
                    "parts": [{"kind": "text", "text": "done"}]
                },
                "timestamp": "2025-01-01T00:00:00Z"
            }
        });
        assert_eq!(result_text(&task).as_deref(), Some("done"));
    }

    #[test]
    fn terminal_states_are_exactly_the_three_final_ones() {
        assert!(!TaskState::Submitted.is_terminal());
        assert!(!TaskState::Working.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
    }
}
