//! Provider catalog.
//!
//! Every upstream the gateway can route to is described by a
//! [`ProviderDescriptor`]: base URL, auth scheme, endpoint paths, and the SSE
//! dialect its streams speak.  The [`ProviderRegistry`] is built once at
//! startup from configuration and never mutated afterwards; request handling
//! only reads from it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::gateway::config::GatewayConfig;
use crate::gateway::error::GatewayError;
use crate::gateway::schema::split_model_id;
use crate::gateway::sse::SseDialect;

/// Closed set of supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Anthropic,
    Cloudflare,
    Cohere,
    Google,
    Groq,
    Ollama,
    OpenAi,
    DeepSeek,
    Qwen,
    HuggingFace,
}

impl ProviderId {
    pub const ALL: [ProviderId; 10] = [
        ProviderId::Anthropic,
        ProviderId::Cloudflare,
        ProviderId::Cohere,
        ProviderId::Google,
        ProviderId::Groq,
        ProviderId::Ollama,
        ProviderId::OpenAi,
        ProviderId::DeepSeek,
        ProviderId::Qwen,
        ProviderId::HuggingFace,
    ];

    /// Stable identifier used as the model-namespace prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::Cloudflare => "cloudflare",
            ProviderId::Cohere => "cohere",
            ProviderId::Google => "google",
            ProviderId::Groq => "groq",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenAi => "openai",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Qwen => "qwen",
            ProviderId::HuggingFace => "huggingface",
        }
    }

    /// Human-readable name for listings and logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Cloudflare => "Cloudflare Workers AI",
            ProviderId::Cohere => "Cohere",
            ProviderId::Google => "Google Gemini",
            ProviderId::Groq => "Groq",
            ProviderId::Ollama => "Ollama",
            ProviderId::OpenAi => "OpenAI",
            ProviderId::DeepSeek => "DeepSeek",
            ProviderId::Qwen => "Qwen",
            ProviderId::HuggingFace => "Hugging Face",
        }
    }

    /// Prefix of the `<PROVIDER>_API_KEY` / `<PROVIDER>_URL` env variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "ANTHROPIC",
            ProviderId::Cloudflare => "CLOUDFLARE",
            ProviderId::Cohere => "COHERE",
            ProviderId::Google => "GOOGLE",
            ProviderId::Groq => "GROQ",
            ProviderId::Ollama => "OLLAMA",
            ProviderId::OpenAi => "OPENAI",
            ProviderId::DeepSeek => "DEEPSEEK",
            ProviderId::Qwen => "QWEN",
            ProviderId::HuggingFace => "HUGGINGFACE",
        }
    }

    /// SSE dialect this provider's streams speak.
    pub fn sse_dialect(&self) -> SseDialect {
        match self {
            ProviderId::Cohere => SseDialect::Named,
            ProviderId::Anthropic => SseDialect::Anthropic,
            ProviderId::Ollama => SseDialect::Ollama,
            _ => SseDialect::OpenAi,
        }
    }

    /// Providers that can serve requests without credentials.
    pub fn keyless(&self) -> bool {
        matches!(self, ProviderId::Ollama)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| GatewayError::Config(format!("unknown provider id: {}", s)))
    }
}

/// How credentials are injected into outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// Token in a custom header (e.g. Anthropic's `x-api-key`).
    Header(String),
    /// Token as a URL query parameter (e.g. Google's `?key=`).
    QueryParam(String),
    /// No credentials.
    None,
}

/// Native endpoint paths relative to the provider base URL.
///
/// `chat` may contain a `{model}` placeholder, substituted with the
/// provider-local model id at request time.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub models: String,
    pub chat: String,
}

/// Immutable description of one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: String,
    pub base_url: String,
    pub auth: AuthScheme,
    pub token: String,
    pub extra_headers: Vec<(String, String)>,
    pub endpoints: ProviderEndpoints,
}

impl ProviderDescriptor {
    /// Build the descriptor for `id` with its well-known defaults, applying
    /// the configured token and optional base-URL override.
    pub fn new(id: ProviderId, token: String, base_url_override: Option<&str>) -> Self {
        let (base_url, auth, extra_headers, endpoints) = provider_defaults(id);
        let base_url = base_url_override
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base_url.to_string());
        Self {
            id,
            display_name: id.display_name().to_string(),
            base_url,
            auth,
            token,
            extra_headers,
            endpoints,
        }
    }

    /// Absolute model-list URL.
    pub fn models_url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoints.models)
    }

    /// Absolute chat URL for `provider_model`.
    ///
    /// Google streams through a dedicated `:streamGenerateContent` endpoint;
    /// every other provider toggles streaming in the request body.
    pub fn chat_url(&self, provider_model: &str, stream: bool) -> String {
        let mut path = self.endpoints.chat.replace("{model}", provider_model);
        if stream && self.id == ProviderId::Google {
            path = path.replace(":generateContent", ":streamGenerateContent?alt=sse");
        }
        format!("{}{}", self.base_url, path)
    }
}

fn provider_defaults(
    id: ProviderId,
) -> (
    &'static str,
    AuthScheme,
    Vec<(String, String)>,
    ProviderEndpoints,
) {
    let endpoints = |models: &str, chat: &str| ProviderEndpoints {
        models: models.to_string(),
        chat: chat.to_string(),
    };
    match id {
        ProviderId::Anthropic => (
            "https://api.anthropic.com",
            AuthScheme::Header("x-api-key".to_string()),
            vec![("anthropic-version".to_string(), "2023-06-01".to_string())],
            endpoints("/v1/models", "/v1/messages"),
        ),
        ProviderId::Cloudflare => (
            // The account segment comes from CLOUDFLARE_URL; there is no
            // usable account-independent default.
            "https://api.cloudflare.com/client/v4/accounts/default/ai",
            AuthScheme::Bearer,
            vec![],
            endpoints("/models/search", "/run/{model}"),
        ),
        ProviderId::Cohere => (
            "https://api.cohere.ai",
            AuthScheme::Bearer,
            vec![],
            endpoints("/v1/models", "/v1/chat"),
        ),
        ProviderId::Google => (
            "https://generativelanguage.googleapis.com/v1beta",
            AuthScheme::QueryParam("key".to_string()),
            vec![],
            endpoints("/models", "/models/{model}:generateContent"),
        ),
        ProviderId::Groq => (
            "https://api.groq.com/openai",
            AuthScheme::Bearer,
            vec![],
            endpoints("/v1/models", "/v1/chat/completions"),
        ),
        ProviderId::Ollama => (
            "http://localhost:11434",
            AuthScheme::None,
            vec![],
            endpoints("/api/tags", "/v1/chat/completions"),
        ),
        ProviderId::OpenAi => (
            "https://api.openai.com",
            AuthScheme::Bearer,
            vec![],
            endpoints("/v1/models", "/v1/chat/completions"),
        ),
        ProviderId::DeepSeek => (
            "https://api.deepseek.com",
            AuthScheme::Bearer,
            vec![],
            endpoints("/models", "/chat/completions"),
        ),
        ProviderId::Qwen => (
            "https://dashscope.aliyuncs.com/compatible-mode",
            AuthScheme::Bearer,
            vec![],
            endpoints("/v1/models", "/v1/chat/completions"),
        ),
        ProviderId::HuggingFace => (
            "https://router.huggingface.co",
            AuthScheme::Bearer,
            vec![],
            endpoints("/v1/models", "/v1/chat/completions"),
        ),
    }
}

/// Init-only catalog of configured providers.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<ProviderDescriptor>>,
}

impl ProviderRegistry {
    /// Register every provider the configuration carries credentials for.
    ///
    /// Keyless providers (Ollama) are registered when a URL is configured.
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        let mut providers = HashMap::new();
        for id in ProviderId::ALL {
            let settings = cfg.provider(id);
            let descriptor = match (&settings.api_key, id.keyless()) {
                (Some(key), _) => {
                    ProviderDescriptor::new(id, key.clone(), settings.url.as_deref())
                }
                (None, true) if settings.url.is_some() => {
                    ProviderDescriptor::new(id, String::new(), settings.url.as_deref())
                }
                _ => {
                    if settings.url.is_some() && log::log_enabled!(log::Level::Debug) {
                        log::debug!("{}_URL set but no API key; provider not registered", id.env_prefix());
                    }
                    continue;
                }
            };
            providers.insert(id, Arc::new(descriptor));
        }
        Self { providers }
    }

    /// Build a registry from explicit descriptors (mostly for tests).
    pub fn from_descriptors(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self {
            providers: descriptors
                .into_iter()
                .map(|d| (d.id, Arc::new(d)))
                .collect(),
        }
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<ProviderDescriptor>> {
        self.providers.get(&id).cloned()
    }

    /// Registered provider ids, in catalog order.
    pub fn ids(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .iter()
            .copied()
            .filter(|id| self.providers.contains_key(id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve a canonical `<provider>/<model>` id to its descriptor and the
    /// provider-local model id.
    pub fn resolve(&self, canonical_model: &str) -> Result<(Arc<ProviderDescriptor>, String), GatewayError> {
        let (provider, model) = split_model_id(canonical_model).ok_or_else(|| {
            GatewayError::Config(format!(
                "model '{}' is not of the form <provider>/<model>",
                canonical_model
            ))
        })?;
        let id = ProviderId::from_str(provider)?;
        let descriptor = self.get(id).ok_or_else(|| {
            GatewayError::Config(format!("provider '{}' is not configured", provider))
        })?;
        Ok((descriptor, model.to_string()))
    }
}
