//! HTTP surface.
//!
//! Three inbound routes: `POST /v1/chat/completions` (JSON body in, JSON or
//! SSE out), `GET /v1/models` (aggregated canonical listing), and
//! `GET /health`.  When A2A agents are configured the listing endpoint
//! `GET /a2a/agents` is additionally exposed if `A2A_EXPOSE` is set.
//!
//! Routing picks the upstream from the `<provider>/` prefix of the request
//! model.  If A2A or MCP integration is enabled, the matching agent loop
//! wraps the provider call; otherwise requests are plain proxied, including
//! any client-supplied tools, whose calls the gateway must *not* intercept.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::gateway::a2a::agent_loop::{inject_agent_tools, A2aAgentLoop};
use crate::gateway::a2a::client::A2aClient;
use crate::gateway::config::GatewayConfig;
use crate::gateway::error::GatewayError;
use crate::gateway::mcp::agent_loop::McpAgentLoop;
use crate::gateway::mcp::client::McpClient;
use crate::gateway::providers::client::{ChatClient, ProviderClient};
use crate::gateway::providers::registry::ProviderRegistry;
use crate::gateway::schema::{ChatCompletionRequest, Message, ModelList};
use crate::gateway::sse::DONE_FRAME;

/// Frames buffered between the agent loop and the HTTP response body.
const DOWNSTREAM_CHANNEL_CAPACITY: usize = 32;

/// Everything request handlers need, assembled once at startup.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub config: Arc<GatewayConfig>,
    pub a2a: Option<Arc<A2aClient>>,
    /// Agent base URLs from static config plus discovery.
    pub agents: Arc<Vec<String>>,
    /// Initialized MCP client with its frozen capability map.
    pub mcp: Option<Arc<McpClient>>,
}

impl AppState {
    fn a2a_active(&self) -> bool {
        self.config.a2a.enable && self.a2a.is_some()
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health));
    if state.a2a_active() && state.config.a2a.expose {
        router = router.route("/a2a/agents", get(list_agents));
    }
    router.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn list_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "agents": *state.agents }))
}

/// Aggregate `/v1/models` across every registered provider concurrently.
///
/// A provider that fails to answer is logged and left out rather than
/// failing the whole listing.
async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let cancel = CancellationToken::new();
    let futures = state.registry.ids().into_iter().filter_map(|id| {
        let descriptor = state.registry.get(id)?;
        let cancel = cancel.clone();
        Some(async move {
            let client = ProviderClient::new(descriptor);
            (id, client.list_models(&cancel).await)
        })
    });

    let mut data = Vec::new();
    for (id, result) in futures_util::future::join_all(futures).await {
        match result {
            Ok(list) => data.extend(list.data),
            Err(err) => log::warn!("{}: model listing failed: {}", id, err),
        }
    }
    Json(ModelList::new(data))
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(mut req): Json<ChatCompletionRequest>,
) -> Response {
    let (descriptor, _provider_model) = match state.registry.resolve(&req.model) {
        Ok(resolved) => resolved,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err),
    };
    let client: Arc<dyn ChatClient> = Arc::new(ProviderClient::new(descriptor));

    // The token is cancelled when the response (or its streaming body) is
    // dropped, which stops the loop and closes the upstream body.
    let cancel = CancellationToken::new();

    let agent_loop = select_agent_loop(&state, &client, &mut req);

    if req.stream.unwrap_or(false) {
        stream_response(cancel, client, agent_loop, req)
    } else {
        match unary_response(&cancel, client, agent_loop, &mut req).await {
            Ok(resp) => Json(resp).into_response(),
            Err(err) => {
                let status = match err {
                    GatewayError::Config(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::BAD_GATEWAY,
                };
                error_response(status, &err)
            }
        }
    }
}

enum ActiveLoop {
    A2a(A2aAgentLoop),
    Mcp(McpAgentLoop),
}

/// Pick the agent loop for this request and inject the tools it serves.
///
/// A2A takes precedence when both integrations are enabled.  Returns `None`
/// for plain proxying.
fn select_agent_loop(
    state: &AppState,
    client: &Arc<dyn ChatClient>,
    req: &mut ChatCompletionRequest,
) -> Option<ActiveLoop> {
    if state.config.a2a.enable {
        if let Some(a2a) = state.a2a.clone() {
            inject_agent_tools(req);
            if !state.agents.is_empty() {
                req.messages.insert(0, agents_preamble(&state.agents));
            }
            return Some(ActiveLoop::A2a(A2aAgentLoop::new(
                Arc::clone(client),
                a2a,
                state.config.max_agent_iterations,
            )));
        }
    }
    if state.config.mcp.enable {
        if let Some(mcp) = state.mcp.clone() {
            let agent_loop =
                McpAgentLoop::new(Arc::clone(client), mcp, state.config.max_agent_iterations);
            agent_loop.inject_tools(req);
            return Some(ActiveLoop::Mcp(agent_loop));
        }
    }
    None
}

/// System message telling the model which agents it can reach.
fn agents_preamble(agents: &[String]) -> Message {
    let mut text = String::from(
        "You can delegate work to remote agents with the query_a2a_agent_card \
         and submit_task_to_agent tools. Available agents:\n",
    );
    for url in agents {
        text.push_str("- ");
        text.push_str(url);
        text.push('\n');
    }
    Message::system(text)
}

async fn unary_response(
    cancel: &CancellationToken,
    client: Arc<dyn ChatClient>,
    agent_loop: Option<ActiveLoop>,
    req: &mut ChatCompletionRequest,
) -> Result<crate::gateway::schema::ChatCompletionResponse, GatewayError> {
    let mut resp = client.chat_completions(cancel, req).await?;
    match agent_loop {
        Some(ActiveLoop::A2a(agent_loop)) => agent_loop.run(cancel, req, &mut resp).await?,
        Some(ActiveLoop::Mcp(agent_loop)) => {
            agent_loop.run_with_tools(cancel, req, &mut resp).await?
        }
        None => {}
    }
    Ok(resp)
}

fn stream_response(
    cancel: CancellationToken,
    client: Arc<dyn ChatClient>,
    agent_loop: Option<ActiveLoop>,
    mut req: ChatCompletionRequest,
) -> Response {
    let (tx, rx) = mpsc::channel::<String>(DOWNSTREAM_CHANNEL_CAPACITY);

    let loop_cancel = cancel.clone();
    tokio::spawn(async move {
        let result = match &agent_loop {
            Some(ActiveLoop::A2a(agent_loop)) => {
                agent_loop.run_with_stream(&loop_cancel, &tx, &mut req).await
            }
            Some(ActiveLoop::Mcp(agent_loop)) => {
                agent_loop
                    .stream_chat_with_tools(&loop_cancel, &tx, &mut req)
                    .await
            }
            None => relay_stream(&loop_cancel, client.as_ref(), &tx, &req).await,
        };
        if let Err(err) = result {
            log::warn!("streaming completion ended with error: {}", err);
        }
    });

    // Moving the drop guard into the body stream cancels the request token
    // when the client disconnects.
    let guard = cancel.drop_guard();
    let body_stream = ReceiverStream::new(rx).map(move |frame| {
        let _ = &guard;
        Ok::<_, Infallible>(Bytes::from(frame))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("static response parts are valid")
}

/// Plain streaming proxy: relay provider frames, then terminate with
/// `[DONE]`.  Used when no agent integration is active so client-side tool
/// calls pass through untouched.
async fn relay_stream(
    cancel: &CancellationToken,
    client: &dyn ChatClient,
    out: &mpsc::Sender<String>,
    req: &ChatCompletionRequest,
) -> Result<(), GatewayError> {
    let result = async {
        let mut rx = match client.stream_chat_completions(cancel, req).await {
            Ok(rx) => rx,
            Err(err) => {
                let frame = json!({ "error": format!("Failed to start streaming: {}", err) });
                let _ = out
                    .send(crate::gateway::sse::data_frame(&frame.to_string()))
                    .await;
                return Err(err);
            }
        };
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(()),
                },
            };
            if frame.trim_end() == DONE_FRAME.trim_end() {
                continue;
            }
            if out.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
    .await;

    let _ = out.send(DONE_FRAME.to_string()).await;
    result
}

fn error_response(status: StatusCode, err: &GatewayError) -> Response {
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
