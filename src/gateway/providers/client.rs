//! Unified HTTP client over the provider catalog.
//!
//! [`ChatClient`] is the seam the agent loops and the HTTP surface program
//! against; [`ProviderClient`] is its production implementation.  One client
//! instance fronts one provider descriptor and does three things: serialize
//! via the provider transforms, inject credentials per the descriptor's auth
//! scheme, and (for streams) pump upstream SSE chunks into a bounded channel
//! of preformed `data: …\n\n` frames.
//!
//! Closing the channel signals end-of-stream.  Cancelling the token closes
//! the upstream body and the channel without producing further frames.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::error::GatewayError;
use crate::gateway::http::shared_http_client;
use crate::gateway::providers::registry::{AuthScheme, ProviderDescriptor};
use crate::gateway::providers::transforms;
use crate::gateway::schema::{
    namespaced_model_id, split_model_id, ChatCompletionRequest, ChatCompletionResponse, ModelList,
};
use crate::gateway::sse::{data_frame, SseChunkReader, StreamEventKind, StreamParser};

/// Frames buffered between the upstream pump and the consumer before
/// backpressure kicks in.
const STREAM_CHANNEL_CAPACITY: usize = 32;

const CHAT_TIMEOUT: Duration = Duration::from_secs(300);
const MODELS_TIMEOUT: Duration = Duration::from_secs(60);

/// Provider-facing operations the rest of the gateway depends on.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One full request/response chat completion.
    async fn chat_completions(
        &self,
        cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError>;

    /// Start a streaming completion.
    ///
    /// Each received item is a complete `data: …\n\n` frame ready to relay.
    /// The channel closes when the upstream stream ends; the upstream
    /// `[DONE]` sentinel is consumed here, never forwarded.
    async fn stream_chat_completions(
        &self,
        cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError>;

    /// List the provider's models with canonical (namespaced) ids.
    async fn list_models(&self, cancel: &CancellationToken) -> Result<ModelList, GatewayError>;
}

/// HTTP implementation of [`ChatClient`] for one provider.
#[derive(Clone)]
pub struct ProviderClient {
    descriptor: Arc<ProviderDescriptor>,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(descriptor: Arc<ProviderDescriptor>) -> Self {
        Self {
            descriptor,
            http: shared_http_client().clone(),
        }
    }

    /// Swap the HTTP client (tests point this at local mock servers).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Strip this provider's namespace prefix if present.
    fn provider_model<'a>(&self, model: &'a str) -> &'a str {
        match split_model_id(model) {
            Some((provider, rest)) if provider == self.descriptor.id.as_str() => rest,
            _ => model,
        }
    }

    /// Append the query-parameter credential where the scheme demands it.
    fn finalize_url(&self, url: String) -> String {
        match &self.descriptor.auth {
            AuthScheme::QueryParam(param) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!(
                    "{}{}{}={}",
                    url,
                    sep,
                    param,
                    urlencoding::encode(&self.descriptor.token)
                )
            }
            _ => url,
        }
    }

    /// Apply header-borne credentials and provider-mandated extra headers.
    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.descriptor.auth {
            AuthScheme::Bearer => {
                builder = builder.bearer_auth(&self.descriptor.token);
            }
            AuthScheme::Header(name) => {
                builder = builder.header(name.as_str(), &self.descriptor.token);
            }
            AuthScheme::QueryParam(_) | AuthScheme::None => {}
        }
        for (name, value) in &self.descriptor.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    async fn post_json(
        &self,
        cancel: &CancellationToken,
        url: String,
        body: &Value,
        timeout: Option<Duration>,
        accept_sse: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut builder = self.http.post(self.finalize_url(url)).json(body);
        builder = self.apply_headers(builder);
        if accept_sse {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Network("request canceled".to_string()));
            }
            result = builder.send() => result?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatClient for ProviderClient {
    async fn chat_completions(
        &self,
        cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let provider_model = self.provider_model(&req.model);
        let canonical = namespaced_model_id(self.descriptor.id.as_str(), provider_model);
        let body = transforms::to_provider_chat_request(&self.descriptor, req, provider_model, false)?;
        let url = self.descriptor.chat_url(provider_model, false);

        let response = self
            .post_json(cancel, url, &body, Some(CHAT_TIMEOUT), false)
            .await?;
        let text = response.text().await.map_err(GatewayError::from)?;
        transforms::to_canonical_chat_response(&self.descriptor, &text, &canonical)
    }

    async fn stream_chat_completions(
        &self,
        cancel: &CancellationToken,
        req: &ChatCompletionRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        let provider_model = self.provider_model(&req.model);
        let body = transforms::to_provider_chat_request(&self.descriptor, req, provider_model, true)?;
        let url = self.descriptor.chat_url(provider_model, true);

        let response = self.post_json(cancel, url, &body, None, true).await?;

        let (tx, rx) = mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
        let parser = StreamParser::new(self.descriptor.id.sse_dialect());
        let cancel = cancel.clone();
        let provider = self.descriptor.id;

        tokio::spawn(async move {
            let mut reader = SseChunkReader::new(Box::pin(response.bytes_stream()));
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = reader.next_chunk() => chunk,
                };
                match chunk {
                    Ok(Some(chunk)) => {
                        let event = parser.classify(&chunk);
                        if event.kind == StreamEventKind::StreamEnd {
                            break;
                        }
                        let Some(data) = chunk.data else { continue };
                        if tx.send(data_frame(&data)).await.is_err() {
                            // Consumer went away; stop pulling from upstream.
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        if log::log_enabled!(log::Level::Warn) {
                            log::warn!("{}: stream read failed: {}", provider, err);
                        }
                        let frame = data_frame(
                            &serde_json::json!({ "error": err.to_string() }).to_string(),
                        );
                        let _ = tx.send(frame).await;
                        break;
                    }
                }
            }
            // Dropping the sender closes the channel; dropping the reader
            // closes the upstream body.
        });

        Ok(rx)
    }

    async fn list_models(&self, cancel: &CancellationToken) -> Result<ModelList, GatewayError> {
        let mut builder = self.http.get(self.finalize_url(self.descriptor.models_url()));
        builder = self.apply_headers(builder).timeout(MODELS_TIMEOUT);
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Network("request canceled".to_string()));
            }
            result = builder.send() => result?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }
        let text = response.text().await.map_err(GatewayError::from)?;
        transforms::to_canonical_models(&self.descriptor, &text)
    }
}
