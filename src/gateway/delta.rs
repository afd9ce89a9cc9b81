//! Streaming tool-call assembly.
//!
//! Providers fragment tool calls across SSE deltas: the first delta for an
//! index usually carries the call id and function name, later ones append
//! pieces of the JSON `arguments` string.  [`ToolCallAccumulator`] stitches
//! them back together, keyed by the upstream-provided `index`.  Upstream is
//! authoritative for ordering, so plain arrival-order concatenation is
//! exactly right and no sequence counter is needed.

use std::collections::BTreeMap;

use crate::gateway::schema::{FinishReason, StreamChunk, ToolCall, ToolCallDelta};

/// Parse one SSE `data:` payload into a [`StreamChunk`], tolerating payloads
/// that are not chunks at all (comments, provider keep-alives).
pub fn parse_chunk(payload: &str) -> Option<StreamChunk> {
    serde_json::from_str(payload).ok()
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

/// Reassembles fragmented tool calls from a stream of deltas and tracks the
/// terminal `finish_reason` for the surrounding iteration.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    saw_tool_delta: bool,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb every choice of one parsed chunk.
    pub fn absorb_chunk(&mut self, chunk: &StreamChunk) {
        for choice in &chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            for delta in choice.delta.tool_calls.as_deref().unwrap_or(&[]) {
                self.absorb_delta(delta);
            }
        }
    }

    /// Fold one tool-call fragment into the call at its index.
    ///
    /// A delta for an unseen index with an entirely empty payload is ignored.
    pub fn absorb_delta(&mut self, delta: &ToolCallDelta) {
        let has_payload = delta.id.is_some()
            || delta.kind.is_some()
            || delta
                .function
                .as_ref()
                .map(|f| f.name.is_some() || f.arguments.is_some())
                .unwrap_or(false);
        if !has_payload && !self.calls.contains_key(&delta.index) {
            return;
        }

        let call = self.calls.entry(delta.index).or_insert_with(|| PartialToolCall {
            id: String::new(),
            kind: "function".to_string(),
            name: String::new(),
            arguments: String::new(),
        });

        if let Some(id) = &delta.id {
            call.id = id.clone();
        }
        if let Some(kind) = &delta.kind {
            call.kind = kind.clone();
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                if !name.is_empty() {
                    call.name = name.clone();
                }
            }
            if let Some(arguments) = &function.arguments {
                if !arguments.is_empty() {
                    call.arguments.push_str(arguments);
                }
            }
        }

        if has_payload {
            self.saw_tool_delta = true;
        }
    }

    /// Whether any delta so far carried a tool-call fragment.
    pub fn saw_tool_calls(&self) -> bool {
        self.saw_tool_delta
    }

    /// The last `finish_reason` observed, if any.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Terminal finish for the iteration, resolving streams that closed
    /// without one: tool-call fragments seen means `tool_calls`, otherwise
    /// `stop`.
    pub fn effective_finish(&self) -> FinishReason {
        match self.finish_reason {
            Some(reason) => reason,
            None if self.saw_tool_delta => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        }
    }

    /// Emit the reassembled calls in ascending index order.
    pub fn into_tool_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .map(|call| ToolCall {
                id: call.id,
                kind: if call.kind.is_empty() {
                    "function".to_string()
                } else {
                    call.kind
                },
                function: crate::gateway::schema::ToolCallFunction {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}
