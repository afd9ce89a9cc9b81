//! A2A agent loop.
//!
//! Exposes two tools to the model and fulfils them against remote A2A
//! agents:
//!
//! - `query_a2a_agent_card(agent_url)`: fetch the agent's card and render a
//!   markdown summary of its skills.
//! - `submit_task_to_agent(agent_url, task_description, additional_context?)`
//!   sends the task as an A2A message and returns the textual result.
//!
//! The iteration machinery lives in [`AgentEngine`]; this module contributes
//! the dispatch table and the A2A-specific argument parsing, rendering, and
//! metadata tagging.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::a2a::client::A2aClient;
use crate::gateway::a2a::types::{result_text, A2aMessage, AgentCard, MessageSendParams};
use crate::gateway::engine::{tool_error_message, unknown_tool_message, AgentEngine, ToolDispatcher};
use crate::gateway::error::GatewayError;
use crate::gateway::providers::client::ChatClient;
use crate::gateway::schema::{
    ChatCompletionRequest, ChatCompletionResponse, Message, Tool, ToolCall,
};

/// Tool name for fetching and summarizing an agent card.
pub const QUERY_AGENT_CARD_TOOL: &str = "query_a2a_agent_card";

/// Tool name for submitting a task to a remote agent.
pub const SUBMIT_TASK_TOOL: &str = "submit_task_to_agent";

/// The tool definitions this loop advertises to the model.
pub fn agent_tools() -> Vec<Tool> {
    vec![
        Tool::function(
            QUERY_AGENT_CARD_TOOL,
            "Fetch a remote agent's card and list the skills it offers.",
            json!({
                "type": "object",
                "properties": {
                    "agent_url": {
                        "type": "string",
                        "description": "Base URL of the agent, e.g. http://calculator-agent:8080"
                    }
                },
                "required": ["agent_url"]
            }),
        ),
        Tool::function(
            SUBMIT_TASK_TOOL,
            "Submit a task to a remote agent and return its textual result.",
            json!({
                "type": "object",
                "properties": {
                    "agent_url": {
                        "type": "string",
                        "description": "Base URL of the agent to send the task to"
                    },
                    "task_description": {
                        "type": "string",
                        "description": "What the agent should do"
                    },
                    "additional_context": {
                        "type": "string",
                        "description": "Optional extra context for the task"
                    }
                },
                "required": ["agent_url", "task_description"]
            }),
        ),
    ]
}

/// Append the A2A tools to a request unless they are already present.
pub fn inject_agent_tools(req: &mut ChatCompletionRequest) {
    let tools = req.tools.get_or_insert_with(Vec::new);
    for tool in agent_tools() {
        if !tools.iter().any(|t| t.function.name == tool.function.name) {
            tools.push(tool);
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryAgentCardArgs {
    agent_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitTaskArgs {
    agent_url: String,
    task_description: String,
    #[serde(default)]
    additional_context: Option<String>,
}

/// The A2A tool-calling engine.
pub struct A2aAgentLoop {
    engine: AgentEngine,
    dispatcher: A2aDispatcher,
}

impl A2aAgentLoop {
    pub fn new(chat: Arc<dyn ChatClient>, a2a: Arc<A2aClient>, max_iterations: u32) -> Self {
        Self {
            engine: AgentEngine::new(chat, max_iterations),
            dispatcher: A2aDispatcher { a2a },
        }
    }

    /// Non-streaming loop; see [`AgentEngine::run`].
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        req: &mut ChatCompletionRequest,
        resp: &mut ChatCompletionResponse,
    ) -> Result<(), GatewayError> {
        self.engine.run(cancel, &self.dispatcher, req, resp).await
    }

    /// Streaming loop; see [`AgentEngine::run_with_stream`].
    pub async fn run_with_stream(
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

struct A2aDispatcher {
    a2a: Arc<A2aClient>,
}

#[async_trait]
impl ToolDispatcher for A2aDispatcher {
    async fn dispatch(&self, cancel: &CancellationToken, call: &ToolCall) -> Message {
        match call.function.name.as_str() {
            QUERY_AGENT_CARD_TOOL => self.query_agent_card(cancel, call).await,
            SUBMIT_TASK_TOOL => self.submit_task(cancel, call).await,
            _ => unknown_tool_message(call),
        }
    }
}

impl A2aDispatcher {
    async fn query_agent_card(&self, cancel: &CancellationToken, call: &ToolCall) -> Message {
        let args: QueryAgentCardArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(err) => return tool_error_message(call, err),
        };
        match self.a2a.get_agent_card(cancel, &args.agent_url).await {
            Ok(card) => Message::tool_result(&call.id, render_agent_card(&card)),
            Err(err) => tool_error_message(call, err),
        }
    }

    async fn submit_task(&self, cancel: &CancellationToken, call: &ToolCall) -> Message {
        let args: SubmitTaskArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(err) => return tool_error_message(call, err),
        };

        let mut text = args.task_description.clone();
        if let Some(context) = &args.additional_context {
            text.push_str("\n\nAdditional context: ");
            text.push_str(context);
        }

        // Tag the message with its originating tool call so agent-side logs
        // can be correlated with this conversation.
        let metadata = json!({
            "tool_call_id": call.id,
            "function": call.function.name,
            "arguments": call.function.arguments,
        });
        let params = MessageSendParams {
            message: A2aMessage::user_text(text, Some(metadata)),
        };

        match self.a2a.send_message(cancel, params, &args.agent_url).await {
            Ok(result) => {
                let content = result_text(&result).unwrap_or_else(|| result.to_string());
                Message::tool_result(&call.id, content)
            }
            Err(err) => tool_error_message(call, err),
        }
    }
}

/// Render an agent card as a markdown skill listing.
fn render_agent_card(card: &AgentCard) -> String {
    let mut out = format!("Agent: {} (v{})\n{}\n\nSkills:\n", card.name, card.version, card.description);
    if card.skills.is_empty() {
        out.push_str("- (none advertised)\n");
        return out;
    }
    for skill in &card.skills {
        out.push_str(&format!("- **{}** (`{}`): {}\n", skill.name, skill.id, skill.description));
        if !skill.input_modes.is_empty() {
            out.push_str(&format!("  - Input modes: {}\n", skill.input_modes.join(", ")));
        }
        if !skill.output_modes.is_empty() {
            out.push_str(&format!("  - Output modes: {}\n", skill.output_modes.join(", ")));
        }
        if let Some(examples) = &skill.examples {
            if !examples.is_empty() {
                out.push_str(&format!("  - Examples: {}\n", examples.join("; ")));
            }
        }
        if let Some(tags) = &skill.tags {
            if !tags.is_empty() {
                out.push_str(&format!("  - Tags: {}\n", tags.join(", ")));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::a2a::types::{AgentCapabilities, AgentSkill};

    #[test]
    fn injecting_tools_twice_does_not_duplicate() {
        let mut req = ChatCompletionRequest::default();
        inject_agent_tools(&mut req);
        inject_agent_tools(&mut req);
        assert_eq!(req.tools.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn card_rendering_lists_every_skill_facet() {
        let card = AgentCard {
            name: "calculator".to_string(),
            description: "Does arithmetic".to_string(),
            url: "http://calc:8080".to_string(),
            version: "1.0.0".to_string(),
            capabilities: AgentCapabilities::default(),
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
            skills: vec![AgentSkill {
                id: "add".to_string(),
                name: "Addition".to_string(),
                description: "Adds two numbers".to_string(),
                input_modes: vec!["text".to_string()],
                output_modes: vec!["text".to_string()],
                examples: Some(vec!["add 2 and 3".to_string()]),
                tags: Some(vec!["math".to_string()]),
            }],
        };
        let rendered = render_agent_card(&card);
        assert!(rendered.contains("**Addition** (`add`)"));
        assert!(rendered.contains("Input modes: text"));
        assert!(rendered.contains("Examples: add 2 and 3"));
        assert!(rendered.contains("Tags: math"));
    }
}
