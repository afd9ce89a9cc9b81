//! HTTP surface tests: router + a mock OpenAI-compatible upstream.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use llm_gateway::gateway::config::GatewayConfig;
use llm_gateway::gateway::providers::registry::{
    ProviderDescriptor, ProviderId, ProviderRegistry,
};
use llm_gateway::gateway::server::{router, AppState};
use llm_gateway::gateway::sse::DONE_FRAME;

/// Serve a minimal OpenAI-compatible upstream and return its base URL.
async fn serve_upstream() -> String {
    let app = Router::new()
        .route(
            "/v1/models",
            get(|| async {
                Json(json!({
                    "object": "list",
                    "data": [{"id": "gpt-4o", "object": "model",
                              "created": 1715367049, "owned_by": "system"}]
                }))
            }),
        )
        .route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                if body["stream"].as_bool().unwrap_or(false) {
                    let sse = concat!(
                        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
                        "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
                        "data: [DONE]\n\n",
                    );
                    axum::http::Response::builder()
                        .header(header::CONTENT_TYPE, "text/event-stream")
                        .body(Body::from(sse))
                        .unwrap()
                } else {
                    axum::http::Response::builder()
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(
                            json!({
                                "id": "c1",
                                "model": body["model"],
                                "choices": [{"index": 0, "finish_reason": "stop",
                                             "message": {"role": "assistant", "content": "Hello!"}}],
                                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                            })
                            .to_string(),
                        ))
                        .unwrap()
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

async fn app_state() -> AppState {
    let upstream = serve_upstream().await;
    let registry = ProviderRegistry::from_descriptors(vec![ProviderDescriptor::new(
        ProviderId::OpenAi,
        "sk-test".to_string(),
        Some(&upstream),
    )]);
    AppState {
        registry: Arc::new(registry),
        config: Arc::new(GatewayConfig::default()),
        a2a: None,
        agents: Arc::new(Vec::new()),
        mcp: None,
    }
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    llm_gateway::init_logger();
    let app = router(app_state().await);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn models_are_listed_with_canonical_ids() {
    llm_gateway::init_logger();
    let app = router(app_state().await);
    let response = app
        .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["object"], "list");
    assert_eq!(json["data"][0]["id"], "openai/gpt-4o");
    assert_eq!(json["data"][0]["served_by"], "openai");
}

#[tokio::test]
async fn non_streaming_chat_is_proxied_and_renamespaced() {
    llm_gateway::init_logger();
    let app = router(app_state().await);
    let request = Request::post("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "model": "openai/gpt-4o",
                "messages": [{"role": "user", "content": "hi"}]
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["model"], "openai/gpt-4o");
    assert_eq!(json["choices"][0]["message"]["content"], "Hello!");
    assert_eq!(json["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn streaming_chat_relays_frames_and_terminates_with_done() {
    llm_gateway::init_logger();
    let app = router(app_state().await);
    let request = Request::post("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "model": "openai/gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\"content\":\"Hel\""));
    assert!(text.contains("\"content\":\"lo\""));
    assert!(text.ends_with(DONE_FRAME), "stream must end with [DONE]: {:?}", text);
    // The upstream terminator is consumed, not relayed twice.
    assert_eq!(text.matches("[DONE]").count(), 1);
}

#[tokio::test]
async fn unprefixed_or_unknown_models_are_rejected() {
    llm_gateway::init_logger();
    let app = router(app_state().await);

    for model in ["gpt-4o", "mistral/large", "groq/llama-3.1-8b-instant"] {
        let request = Request::post("/v1/chat/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"model": model, "messages": [{"role": "user", "content": "hi"}]})
                    .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "model {}", model);
        let json = body_json(response.into_body()).await;
        assert!(json["error"].as_str().unwrap().len() > 0);
    }
}
