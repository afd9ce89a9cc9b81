//! Multi-iteration tool-calling engine.
//!
//! One [`AgentEngine`] drives the model↔tool round trips for a single
//! request: call the provider, collect the tool calls it asked for, hand each
//! to a [`ToolDispatcher`], fold every result back into the conversation as a
//! tool-role message, and call the provider again, until the model stops or
//! the iteration budget runs out.  The A2A and MCP loops are this engine with
//! different dispatchers.
//!
//! Two guarantees shape everything here:
//!
//! - A dispatcher never fails.  Malformed arguments, unreachable agents, and
//!   unknown tool names all become tool-role *content* the model can read and
//!   react to; only configuration errors and stream-start failures abort.
//! - In streaming mode `data: [DONE]\n\n` is the last frame written
//!   downstream on every exit path: success, error, cancellation, or
//!   iteration cap.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::delta::{parse_chunk, ToolCallAccumulator};
use crate::gateway::error::GatewayError;
use crate::gateway::providers::client::ChatClient;
use crate::gateway::schema::{
    ChatCompletionRequest, ChatCompletionResponse, FinishReason, Message, ToolCall,
};
use crate::gateway::sse::{data_frame, DONE_FRAME, DONE_PAYLOAD};

/// Resolves one tool call into a tool-role message.
///
/// Implementations must be infallible: a failure is reported *inside* the
/// returned message (e.g. `"Error processing <name>: <detail>"`), so the loop
/// keeps going and the model decides what to do about it.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, cancel: &CancellationToken, call: &ToolCall) -> Message;
}

/// The iteration engine shared by the A2A and MCP agent loops.
pub struct AgentEngine {
    chat: Arc<dyn ChatClient>,
    max_iterations: u32,
}

impl AgentEngine {
    pub fn new(chat: Arc<dyn ChatClient>, max_iterations: u32) -> Self {
        Self {
            chat,
            max_iterations,
        }
    }

    fn validate(&self, req: &ChatCompletionRequest) -> Result<(), GatewayError> {
        if req.model.trim().is_empty() {
            return Err(GatewayError::Config(
                "agent loop requires a configured provider and model".to_string(),
            ));
        }
        Ok(())
    }

    /// Non-streaming loop.
    ///
    /// `resp` holds the first model turn on entry and the final one on exit.
    /// Each iteration appends the assistant message, dispatches its tool
    /// calls in order, appends the matching tool-role messages, and reissues
    /// the completion.  Hitting the iteration budget is not an error: a
    /// warning is logged and the last response stands.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        dispatcher: &dyn ToolDispatcher,
        req: &mut ChatCompletionRequest,
        resp: &mut ChatCompletionResponse,
    ) -> Result<(), GatewayError> {
        self.validate(req)?;

        for iteration in 0..self.max_iterations {
            let tool_calls = resp.tool_calls().to_vec();
            if tool_calls.is_empty() {
                return Ok(());
            }
            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "agent iteration {}: dispatching {} tool call(s)",
                    iteration,
                    tool_calls.len()
                );
            }

            let assistant = resp
                .choices
                .first()
                .map(|c| c.message.clone())
                .unwrap_or_else(|| Message::assistant_tool_calls(tool_calls.clone()));
            req.messages.push(assistant);

            self.dispatch_all(cancel, dispatcher, &tool_calls, req).await;

            if cancel.is_cancelled() {
                return Ok(());
            }
            *resp = self.chat.chat_completions(cancel, req).await?;
        }

        log::warn!(
            "agent loop reached its iteration budget ({}); returning the last model turn",
            self.max_iterations
        );
        Ok(())
    }

    /// Streaming loop.
    ///
    /// Provider frames are relayed to `out` verbatim while tool-call
    /// fragments are reassembled on the side.  When an iteration ends in
    /// tool calls, they are dispatched and the next iteration begins; when it
    /// ends in a stop, the loop returns.  A terminal `[DONE]` frame is
    /// written on every exit path, including errors.
    pub async fn run_with_stream(
        &self,
        cancel: &CancellationToken,
        dispatcher: &dyn ToolDispatcher,
        out: &mpsc::Sender<String>,
        req: &mut ChatCompletionRequest,
    ) -> Result<(), GatewayError> {
        let result = self.stream_iterations(cancel, dispatcher, out, req).await;
        let _ = out.send(DONE_FRAME.to_string()).await;
        result
    }

    async fn stream_iterations(
        &self,
        cancel: &CancellationToken,
        dispatcher: &dyn ToolDispatcher,
        out: &mpsc::Sender<String>,
        req: &mut ChatCompletionRequest,
    ) -> Result<(), GatewayError> {
        if let Err(err) = self.validate(req) {
            let _ = out
                .send(data_frame(&json!({ "error": err.to_string() }).to_string()))
                .await;
            return Err(err);
        }

        for _iteration in 0..self.max_iterations {
            let mut rx = match self.chat.stream_chat_completions(cancel, req).await {
                Ok(rx) => rx,
                Err(err) => {
                    let frame = json!({
                        "error": format!("Failed to start streaming: {}", err)
                    });
                    let _ = out.send(data_frame(&frame.to_string())).await;
                    return Err(err);
                }
            };

            let mut acc = ToolCallAccumulator::new();
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let Some(payload) = frame.strip_prefix("data: ") else {
                    continue;
                };
                let payload = payload.trim_end();
                if payload == DONE_PAYLOAD {
                    // The engine owns the terminal frame.
                    continue;
                }
                if let Some(chunk) = parse_chunk(payload) {
                    acc.absorb_chunk(&chunk);
                }
                if out.send(frame).await.is_err() {
                    // Downstream client went away.
                    return Ok(());
                }
            }

            if acc.effective_finish() != FinishReason::ToolCalls || !acc.saw_tool_calls() {
                return Ok(());
            }

            let tool_calls = acc.into_tool_calls();
            req.messages
                .push(Message::assistant_tool_calls(tool_calls.clone()));
            self.dispatch_all(cancel, dispatcher, &tool_calls, req).await;
        }

        log::warn!(
            "streaming agent loop reached its iteration budget ({})",
            self.max_iterations
        );
        Ok(())
    }

    /// Dispatch every call in assistant order, appending each result so
    /// tool-role messages line up 1:1 with the tool-call array.
    async fn dispatch_all(
        &self,
        cancel: &CancellationToken,
        dispatcher: &dyn ToolDispatcher,
        tool_calls: &[ToolCall],
        req: &mut ChatCompletionRequest,
    ) {
        for call in tool_calls {
            let message = dispatcher.dispatch(cancel, call).await;
            req.messages.push(message);
        }
    }
}

/// The tool-role message for a call nobody recognizes.
pub fn unknown_tool_message(call: &ToolCall) -> Message {
    Message::tool_result(&call.id, format!("Unknown tool: {}", call.function.name))
}

/// The tool-role message for a call that failed while being processed.
pub fn tool_error_message(call: &ToolCall, detail: impl std::fmt::Display) -> Message {
    Message::tool_result(
        &call.id,
        format!("Error processing {}: {}", call.function.name, detail),
    )
}
