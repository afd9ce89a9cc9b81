//! End-to-end tests of the A2A agent loop against a scripted provider and a
//! mock A2A agent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use llm_gateway::gateway::a2a::agent_loop::{
    A2aAgentLoop, QUERY_AGENT_CARD_TOOL, SUBMIT_TASK_TOOL,
};
use llm_gateway::gateway::a2a::client::A2aClient;
use llm_gateway::gateway::error::GatewayError;
use llm_gateway::gateway::providers::client::ChatClient;
use llm_gateway::gateway::schema::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, FinishReason, Message, ModelList, Role,
    ToolCall,
};
use llm_gateway::gateway::sse::{data_frame, DONE_FRAME};

// ------------------------------------------------------------ mock provider

enum StreamScript {
    Frames(Vec<String>),
    StartError(String),
}

struct MockChatClient {
    unary: Mutex<VecDeque<ChatCompletionResponse>>,
    streams: Mutex<VecDeque<StreamScript>>,
    chat_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    seen_requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockChatClient {
    fn new() -> Self {
        Self {
            unary: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            chat_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            seen_requests: Mutex::new(Vec::new()),
        }
    }

    async fn push_unary(&self, resp: ChatCompletionResponse) {
        self.unary.lock().await.push_back(resp);
    }

    async fn push_stream(&self, script: StreamScript) {
        self.streams.lock().await.push_back(script);
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn chat_completions(
        &self,
        _cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_requests.lock().await.push(req.clone());
        self.unary
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| GatewayError::Network("mock provider exhausted".to_string()))
    }

    async fn stream_chat_completions(
        &self,
        _cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_requests.lock().await.push(req.clone());
        match self.streams.lock().await.pop_front() {
            Some(StreamScript::Frames(frames)) => {
                let (tx, rx) = mpsc::channel(16);
                tokio::spawn(async move {
                    for frame in frames {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                });
                Ok(rx)
            }
            Some(StreamScript::StartError(msg)) => Err(GatewayError::Network(msg)),
            None => Err(GatewayError::Network("mock stream exhausted".to_string())),
        }
    }

    async fn list_models(&self, _cancel: &CancellationToken) -> Result<ModelList, GatewayError> {
        Ok(ModelList::new(Vec::new()))
    }
}

fn stop_response(content: &str) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: "cmpl-test".to_string(),
        model: "openai/gpt-4".to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(FinishReason::Stop),
            message: Message::assistant(content),
        }],
        usage: None,
    }
}

fn tool_call_response(calls: Vec<ToolCall>) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: "cmpl-test".to_string(),
        model: "openai/gpt-4".to_string(),
        choices: vec![Choice {
            index: 0,
            finish_reason: Some(FinishReason::ToolCalls),
            message: Message::assistant_tool_calls(calls),
        }],
        usage: None,
    }
}

fn request(user: &str) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: "openai/gpt-4".to_string(),
        messages: vec![Message::user(user)],
        ..Default::default()
    }
}

fn frame(value: Value) -> String {
    data_frame(&value.to_string())
}

// ----------------------------------------------------------- mock A2A agent

#[derive(Clone)]
struct AgentState {
    captured: Arc<Mutex<Vec<Value>>>,
    reply_text: &'static str,
}

async fn serve_agent(reply_text: &'static str) -> (String, Arc<Mutex<Vec<Value>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let state = AgentState {
        captured: Arc::clone(&captured),
        reply_text,
    };

    let card = json!({
        "name": "calculator",
        "description": "Performs arithmetic",
        "url": "http://calc.internal",
        "version": "1.0.0",
        "capabilities": {"streaming": false},
        "defaultInputModes": ["text"],
        "defaultOutputModes": ["text"],
        "skills": [
            {"id": "add", "name": "add", "description": "Adds numbers",
             "inputModes": ["text"], "outputModes": ["text"]},
            {"id": "multiply", "name": "multiply", "description": "Multiplies numbers",
             "inputModes": ["text"], "outputModes": ["text"]}
        ]
    });

    let app = Router::new()
        .route(
            "/.well-known/agent.json",
            get(move || {
                let card = card.clone();
                async move { Json(card) }
            }),
        )
        .route(
            "/a2a",
            post(|State(state): State<AgentState>, Json(body): Json<Value>| async move {
                state.captured.lock().await.push(body.clone());
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": {
                        "kind": "message",
                        "messageId": "m-1",
                        "role": "agent",
                        "parts": [{"kind": "text", "text": state.reply_text}]
                    }
                }))
            }),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, captured)
}

fn a2a_loop(chat: &Arc<MockChatClient>, max_iterations: u32) -> A2aAgentLoop {
    let chat: Arc<dyn ChatClient> = Arc::clone(chat) as Arc<dyn ChatClient>;
    let a2a = Arc::new(A2aClient::new(std::time::Duration::from_secs(5)));
    A2aAgentLoop::new(chat, a2a, max_iterations)
}

// ------------------------------------------------------------------- tests

#[tokio::test]
async fn no_tool_response_passes_through_without_reinvocation() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    let agent_loop = a2a_loop(&chat, 10);

    let mut req = request("hi");
    let mut resp = stop_response("hello");
    let cancel = CancellationToken::new();
    agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap();

    assert_eq!(chat.chat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(resp.choices[0].message.content, "hello");
    assert_eq!(req.messages.len(), 1, "conversation untouched");
}

#[tokio::test]
async fn agent_card_round_trip_folds_markdown_into_the_conversation() {
    llm_gateway::init_logger();
    let (agent_url, _captured) = serve_agent("unused").await;

    let chat = Arc::new(MockChatClient::new());
    chat.push_unary(stop_response("The calculator offers add and multiply."))
        .await;
    let agent_loop = a2a_loop(&chat, 10);

    let mut req = request("list calculator skills");
    let mut resp = tool_call_response(vec![ToolCall::function(
        "call_1",
        QUERY_AGENT_CARD_TOOL,
        json!({ "agent_url": agent_url }).to_string(),
    )]);
    let cancel = CancellationToken::new();
    agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap();

    assert_eq!(chat.chat_calls.load(Ordering::SeqCst), 1);
    // The second upstream call sees: user, assistant w/ tool_call, tool reply.
    let seen = chat.seen_requests.lock().await;
    let messages = &seen[0].messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert!(messages[1].tool_calls.is_some());
    assert_eq!(messages[2].role, Role::Tool);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
    assert!(messages[2].content.contains("add"));
    assert!(messages[2].content.contains("multiply"));

    assert_eq!(
        resp.choices[0].message.content,
        "The calculator offers add and multiply."
    );
}

#[tokio::test]
async fn streaming_fragments_reassemble_and_dispatch_the_task() {
    llm_gateway::init_logger();
    let (agent_url, captured) = serve_agent("5").await;

    let chat = Arc::new(MockChatClient::new());
    let args_prefix = format!("{{\"agent_url\":\"{}\",", agent_url);
    let args_suffix = "\"task_description\":\"sum 2 and 3\"}";
    chat.push_stream(StreamScript::Frames(vec![
        frame(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "t1",
             "function": {"name": SUBMIT_TASK_TOOL, "arguments": args_prefix}}
        ]}, "finish_reason": null}]})),
        frame(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": args_suffix}}
        ]}, "finish_reason": "tool_calls"}]})),
    ]))
    .await;
    chat.push_stream(StreamScript::Frames(vec![frame(
        json!({"choices": [{"delta": {"content": "The sum is 5."}, "finish_reason": "stop"}]}),
    )]))
    .await;

    let agent_loop = a2a_loop(&chat, 10);
    let mut req = request("sum 2 and 3 using the calculator");
    let (tx, mut rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    agent_loop
        .run_with_stream(&cancel, &tx, &mut req)
        .await
        .unwrap();
    drop(tx);

    // Every upstream frame is relayed in order and [DONE] is last.
    let mut frames = Vec::new();
    while let Some(f) = rx.recv().await {
        frames.push(f);
    }
    assert_eq!(frames.len(), 4);
    assert!(frames[0].contains("t1"));
    assert!(frames[2].contains("The sum is 5."));
    assert_eq!(frames.last().unwrap(), DONE_FRAME);

    // The agent received the reassembled task with its tool-call metadata.
    let bodies = captured.lock().await;
    assert_eq!(bodies.len(), 1);
    let params = &bodies[0]["params"]["message"];
    assert_eq!(params["parts"][0]["text"], "sum 2 and 3");
    assert_eq!(params["metadata"]["tool_call_id"], "t1");
    assert_eq!(
        params["metadata"]["arguments"],
        format!("{}{}", args_prefix, args_suffix)
    );

    // The follow-up request carries the assistant tool-call and its answer.
    let seen = chat.seen_requests.lock().await;
    let follow_up = &seen[1].messages;
    assert_eq!(follow_up[1].role, Role::Assistant);
    assert_eq!(
        follow_up[1].tool_calls.as_ref().unwrap()[0].function.arguments,
        format!("{}{}", args_prefix, args_suffix)
    );
    assert_eq!(follow_up[2].role, Role::Tool);
    assert_eq!(follow_up[2].content, "5");
}

#[tokio::test]
async fn streaming_iteration_cap_stops_after_the_configured_budget() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    for _ in 0..3 {
        chat.push_stream(StreamScript::Frames(vec![frame(
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "t1",
                 "function": {"name": "frobnicate", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]}),
        )]))
        .await;
    }

    let agent_loop = a2a_loop(&chat, 2);
    let mut req = request("loop forever");
    let (tx, mut rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    agent_loop
        .run_with_stream(&cancel, &tx, &mut req)
        .await
        .unwrap();
    drop(tx);

    assert_eq!(chat.stream_calls.load(Ordering::SeqCst), 2);
    let mut frames = Vec::new();
    while let Some(f) = rx.recv().await {
        frames.push(f);
    }
    assert_eq!(frames.last().unwrap(), DONE_FRAME);
}

#[tokio::test]
async fn stream_start_failure_emits_error_frame_then_done() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    chat.push_stream(StreamScript::StartError("connection refused".to_string()))
        .await;

    let agent_loop = a2a_loop(&chat, 10);
    let mut req = request("hi");
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let result = agent_loop.run_with_stream(&cancel, &tx, &mut req).await;
    drop(tx);

    assert!(result.is_err());
    let mut frames = Vec::new();
    while let Some(f) = rx.recv().await {
        frames.push(f);
    }
    assert_eq!(frames.len(), 2);
    assert!(frames[0].starts_with("data: "));
    assert!(frames[0].contains("Failed to start streaming:"));
    assert!(frames[0].contains("connection refused"));
    assert_eq!(frames[1], DONE_FRAME);
}

#[tokio::test]
async fn unknown_tool_is_answered_inline_and_the_loop_continues() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    chat.push_unary(stop_response("giving up on frobnication"))
        .await;

    let agent_loop = a2a_loop(&chat, 10);
    let mut req = request("frobnicate please");
    let mut resp = tool_call_response(vec![ToolCall::function("call_9", "frobnicate", "{}")]);
    let cancel = CancellationToken::new();
    agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap();

    let seen = chat.seen_requests.lock().await;
    let tool_msg = &seen[0].messages[2];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.content, "Unknown tool: frobnicate");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_9"));
    assert_eq!(chat.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_tool_call_gets_exactly_one_matching_tool_message() {
    llm_gateway::init_logger();
    let (agent_url, _captured) = serve_agent("ok").await;

    let chat = Arc::new(MockChatClient::new());
    chat.push_unary(stop_response("done")).await;

    let agent_loop = a2a_loop(&chat, 10);
    let mut req = request("do three things");
    let mut resp = tool_call_response(vec![
        ToolCall::function(
            "call_a",
            SUBMIT_TASK_TOOL,
            json!({"agent_url": agent_url, "task_description": "first"}).to_string(),
        ),
        ToolCall::function("call_b", "frobnicate", "{}"),
        ToolCall::function("call_c", QUERY_AGENT_CARD_TOOL, "{not json"),
    ]);
    let cancel = CancellationToken::new();
    agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap();

    let seen = chat.seen_requests.lock().await;
    let messages = &seen[0].messages;
    // user, assistant, then one tool message per call, in call order.
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_a"));
    assert_eq!(messages[2].content, "ok");
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_b"));
    assert_eq!(messages[3].content, "Unknown tool: frobnicate");
    assert_eq!(messages[4].tool_call_id.as_deref(), Some("call_c"));
    assert!(messages[4]
        .content
        .starts_with(&format!("Error processing {}:", QUERY_AGENT_CARD_TOOL)));
}

#[tokio::test]
async fn non_streaming_cap_bounds_upstream_calls() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    for _ in 0..3 {
        chat.push_unary(tool_call_response(vec![ToolCall::function(
            "call_x",
            "frobnicate",
            "{}",
        )]))
        .await;
    }

    let agent_loop = a2a_loop(&chat, 2);
    let mut req = request("never stop");
    let mut resp = tool_call_response(vec![ToolCall::function("call_x", "frobnicate", "{}")]);
    let cancel = CancellationToken::new();
    agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap();

    assert_eq!(chat.chat_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_model_fails_fast_with_a_config_error() {
    llm_gateway::init_logger();
    let chat = Arc::new(MockChatClient::new());
    let agent_loop = a2a_loop(&chat, 10);

    let mut req = ChatCompletionRequest::default();
    let mut resp = tool_call_response(vec![ToolCall::function("c", "frobnicate", "{}")]);
    let cancel = CancellationToken::new();
    let err = agent_loop.run(&cancel, &mut req, &mut resp).await.unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
    assert_eq!(chat.chat_calls.load(Ordering::SeqCst), 0);
}
