//! Pure request/response transforms between the canonical schema and each
//! provider's native wire format.
//!
//! Nothing in this module performs I/O.  The provider client serializes a
//! request with [`to_provider_chat_request`], POSTs it, and hands the body to
//! [`to_canonical_chat_response`]; model listings go through
//! [`to_canonical_models`].  OpenAI-compatible providers pass the canonical
//! shape through nearly untouched; Anthropic, Google, Cohere, and Cloudflare
//! need real restructuring.

use serde_json::{json, Value};

use crate::gateway::error::GatewayError;
use crate::gateway::providers::registry::{ProviderDescriptor, ProviderId};
use crate::gateway::schema::{
    namespaced_model_id, ChatCompletionRequest, ChatCompletionResponse, Choice, FinishReason,
    Message, Model, ModelList, Role, ToolCall, Usage,
};

/// Serialize a canonical request into the provider's native chat body.
///
/// `provider_model` is the model id with the `<provider>/` prefix already
/// stripped; `stream` selects the streaming variant of the body.
pub fn to_provider_chat_request(
    descriptor: &ProviderDescriptor,
    req: &ChatCompletionRequest,
    provider_model: &str,
    stream: bool,
) -> Result<Value, GatewayError> {
    match descriptor.id {
        ProviderId::Anthropic => anthropic_request(req, provider_model, stream),
        ProviderId::Google => google_request(req),
        ProviderId::Cohere => cohere_request(req, provider_model, stream),
        ProviderId::Cloudflare => cloudflare_request(req, stream),
        _ => openai_request(req, provider_model, stream),
    }
}

/// Parse a provider's native chat response body into the canonical shape.
///
/// `canonical_model` is echoed back so callers always see the namespaced id
/// they asked for.
pub fn to_canonical_chat_response(
    descriptor: &ProviderDescriptor,
    body: &str,
    canonical_model: &str,
) -> Result<ChatCompletionResponse, GatewayError> {
    match descriptor.id {
        ProviderId::Anthropic => anthropic_response(body, canonical_model),
        ProviderId::Google => google_response(body, canonical_model),
        ProviderId::Cohere => cohere_response(body, canonical_model),
        ProviderId::Cloudflare => cloudflare_response(body, canonical_model),
        _ => {
            let mut resp: ChatCompletionResponse = serde_json::from_str(body)?;
            resp.model = canonical_model.to_string();
            Ok(resp)
        }
    }
}

/// Parse a provider's native model-list body into the canonical listing.
///
/// Every returned id carries the `<provider>/` prefix exactly once.
pub fn to_canonical_models(
    descriptor: &ProviderDescriptor,
    body: &str,
) -> Result<ModelList, GatewayError> {
    let provider = descriptor.id.as_str();
    let value: Value = serde_json::from_str(body)?;

    let (entries, id_field) = match descriptor.id {
        // {result:[{name}]}
        ProviderId::Cloudflare => (value.get("result"), "name"),
        // {models:[{name}]}
        ProviderId::Ollama | ProviderId::Cohere | ProviderId::Google => {
            (value.get("models"), "name")
        }
        // {data:[{id}]}
        _ => (value.get("data"), "id"),
    };

    let entries = entries.and_then(|v| v.as_array()).ok_or_else(|| {
        GatewayError::Decode(format!("{}: model list missing its entries array", provider))
    })?;

    let mut data = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw_id = match entry.get(id_field).and_then(|v| v.as_str()) {
            Some(id) => id,
            None => continue,
        };
        // Google lists models as "models/<id>".
        let raw_id = raw_id.strip_prefix("models/").unwrap_or(raw_id);
        data.push(Model {
            id: namespaced_model_id(provider, raw_id),
            object: "model".to_string(),
            created: entry.get("created").and_then(|v| v.as_i64()).unwrap_or(0),
            owned_by: entry
                .get("owned_by")
                .and_then(|v| v.as_str())
                .unwrap_or(provider)
                .to_string(),
            served_by: provider.to_string(),
        });
    }
    Ok(ModelList::new(data))
}

// ---------------------------------------------------------------- openai ---

fn openai_request(
    req: &ChatCompletionRequest,
    provider_model: &str,
    stream: bool,
) -> Result<Value, GatewayError> {
    let mut body = serde_json::to_value(req)?;
    body["model"] = json!(provider_model);
    if stream {
        body["stream"] = json!(true);
    } else if let Some(obj) = body.as_object_mut() {
        obj.remove("stream");
    }
    Ok(body)
}

// ------------------------------------------------------------- anthropic ---

const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;

fn anthropic_request(
    req: &ChatCompletionRequest,
    provider_model: &str,
    stream: bool,
) -> Result<Value, GatewayError> {
    let mut messages = Vec::new();
    for msg in &req.messages {
        match msg.role {
            Role::System => {}
            Role::User => messages.push(json!({"role": "user", "content": msg.content})),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": msg.content}));
                }
                for tc in msg.tool_calls.as_deref().unwrap_or(&[]) {
                    let input: Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.function.name,
                        "input": input,
                    }));
                }
                messages.push(json!({"role": "assistant", "content": blocks}));
            }
            Role::Tool => {
                messages.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    }],
                }));
            }
        }
    }

    let mut body = json!({
        "model": provider_model,
        "max_tokens": req.max_completion_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        "messages": messages,
    });
    if let Some(system) = join_system(&req.messages) {
        body["system"] = json!(system);
    }
    if let Some(tools) = &req.tools {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.function.name,
                        "description": t.function.description,
                        "input_schema": t.function.parameters,
                    })
                })
                .collect(),
        );
    }
    if stream {
        body["stream"] = json!(true);
    }
    Ok(body)
}

fn anthropic_response(body: &str, canonical_model: &str) -> Result<ChatCompletionResponse, GatewayError> {
    let value: Value = serde_json::from_str(body)?;
    let blocks = value
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| GatewayError::Decode("anthropic: response missing content blocks".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                text.push_str(block.get("text").and_then(|v| v.as_str()).unwrap_or(""));
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let arguments = block
                    .get("input")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "{}".to_string());
                tool_calls.push(ToolCall::function(id, name, arguments));
            }
            _ => {}
        }
    }

    let finish_reason = match value.get("stop_reason").and_then(|v| v.as_str()) {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let usage = value.get("usage").map(|u| {
        let prompt = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let completion = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    });

    Ok(ChatCompletionResponse {
        id: value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        model: canonical_model.to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(finish_reason),
            message: Message {
                role: Role::Assistant,
                content: text,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            },
        }],
        usage,
    })
}

// ---------------------------------------------------------------- google ---

fn google_request(req: &ChatCompletionRequest) -> Result<Value, GatewayError> {
    // functionResponse parts need the function name; recover it from the
    // assistant tool calls earlier in the conversation.
    let mut call_names = std::collections::HashMap::new();
    for msg in &req.messages {
        for tc in msg.tool_calls.as_deref().unwrap_or(&[]) {
            call_names.insert(tc.id.clone(), tc.function.name.clone());
        }
    }

    let mut contents = Vec::new();
    for msg in &req.messages {
        match msg.role {
            Role::System => {}
            Role::User => {
                contents.push(json!({"role": "user", "parts": [{"text": msg.content}]}));
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(json!({"text": msg.content}));
                }
                for tc in msg.tool_calls.as_deref().unwrap_or(&[]) {
                    let args: Value =
                        serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                    parts.push(json!({"functionCall": {"name": tc.function.name, "args": args}}));
                }
                contents.push(json!({"role": "model", "parts": parts}));
            }
            Role::Tool => {
                let name = msg
                    .tool_call_id
                    .as_ref()
                    .and_then(|id| call_names.get(id))
                    .cloned()
                    .unwrap_or_default();
                contents.push(json!({
                    "role": "user",
                    "parts": [{"functionResponse": {"name": name, "response": {"content": msg.content}}}],
                }));
            }
        }
    }

    let mut body = json!({ "contents": contents });
    if let Some(system) = join_system(&req.messages) {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    if let Some(tools) = &req.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.function.name,
                    "description": t.function.description,
                    "parameters": t.function.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }
    if let Some(max) = req.max_completion_tokens {
        body["generationConfig"] = json!({"maxOutputTokens": max});
    }
    Ok(body)
}

fn google_response(body: &str, canonical_model: &str) -> Result<ChatCompletionResponse, GatewayError> {
    let value: Value = serde_json::from_str(body)?;
    let candidate = value
        .get("candidates")
        .and_then(|v| v.get(0))
        .ok_or_else(|| GatewayError::Decode("google: response missing candidates".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(t) = part.get("text").and_then(|v| v.as_str()) {
                text.push_str(t);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let arguments = call
                    .get("args")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "{}".to_string());
                // Gemini does not assign call ids; synthesize stable ones.
                let id = format!("call_{}", tool_calls.len());
                tool_calls.push(ToolCall::function(id, name, arguments));
            }
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        FinishReason::ToolCalls
    } else {
        match candidate.get("finishReason").and_then(|v| v.as_str()) {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    };

    let usage = value.get("usageMetadata").map(|u| {
        let prompt = u.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let completion = u
            .get("candidatesTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    });

    Ok(ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid_like_from(&value)),
        model: canonical_model.to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(finish_reason),
            message: Message {
                role: Role::Assistant,
                content: text,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
            },
        }],
        usage,
    })
}

// Gemini responses carry a responseId; fall back to a constant so the
// transform stays a pure function.
fn uuid_like_from(value: &Value) -> String {
    value
        .get("responseId")
        .and_then(|v| v.as_str())
        .unwrap_or("google")
        .to_string()
}

// ---------------------------------------------------------------- cohere ---

fn cohere_request(
    req: &ChatCompletionRequest,
    provider_model: &str,
    stream: bool,
) -> Result<Value, GatewayError> {
    let message = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let mut history = Vec::new();
    let last_user_idx = req
        .messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(req.messages.len());
    for msg in &req.messages[..last_user_idx] {
        let role = match msg.role {
            Role::User => "USER",
            Role::Assistant => "CHATBOT",
            Role::System => "SYSTEM",
            Role::Tool => continue,
        };
        history.push(json!({"role": role, "message": msg.content}));
    }

    let mut body = json!({
        "model": provider_model,
        "message": message,
    });
    if !history.is_empty() {
        body["chat_history"] = Value::Array(history);
    }
    if let Some(system) = join_system(&req.messages) {
        body["preamble"] = json!(system);
    }
    if let Some(max) = req.max_completion_tokens {
        body["max_tokens"] = json!(max);
    }
    if stream {
        body["stream"] = json!(true);
    }
    Ok(body)
}

fn cohere_response(body: &str, canonical_model: &str) -> Result<ChatCompletionResponse, GatewayError> {
    let value: Value = serde_json::from_str(body)?;
    let text = value
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::Decode("cohere: response missing text".to_string()))?
        .to_string();

    let finish_reason = match value.get("finish_reason").and_then(|v| v.as_str()) {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("ERROR_TOXIC") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let usage = value
        .get("meta")
        .and_then(|m| m.get("tokens"))
        .map(|t| {
            let prompt = t.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let completion = t.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

    Ok(ChatCompletionResponse {
        id: value
            .get("generation_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        model: canonical_model.to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(finish_reason),
            message: Message::assistant(text),
        }],
        usage,
    })
}

// ------------------------------------------------------------ cloudflare ---

fn cloudflare_request(req: &ChatCompletionRequest, stream: bool) -> Result<Value, GatewayError> {
    let mut body = json!({ "prompt": flatten_prompt(&req.messages) });
    if let Some(max) = req.max_completion_tokens {
        body["max_tokens"] = json!(max);
    }
    if stream {
        body["stream"] = json!(true);
    }
    Ok(body)
}

fn cloudflare_response(body: &str, canonical_model: &str) -> Result<ChatCompletionResponse, GatewayError> {
    let value: Value = serde_json::from_str(body)?;
    let text = value
        .get("result")
        .and_then(|r| r.get("response"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::Decode("cloudflare: response missing result.response".to_string()))?
        .to_string();

    Ok(ChatCompletionResponse {
        id: crate::gateway::schema::completion_id(),
        model: canonical_model.to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(FinishReason::Stop),
            message: Message::assistant(text),
        }],
        usage: None,
    })
}

// --------------------------------------------------------------- helpers ---

/// Concatenate the system messages of a conversation, if any.
fn join_system(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Collapse a conversation to a single labelled prompt string.
fn flatten_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        let label = match msg.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&msg.content);
        prompt.push('\n');
    }
    prompt
}
