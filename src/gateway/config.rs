//! Environment-driven configuration.
//!
//! Everything the gateway needs is read from the process environment at
//! startup.  Durations accept `90s`, `1500ms`, `2m`, `1h`, or a bare integer
//! meaning seconds.  Booleans accept `true`/`false`, `1`/`0`, `yes`/`no`,
//! `on`/`off` (case-insensitive).
//!
//! | Variable | Default |
//! |---|---|
//! | `SERVER_HOST` / `SERVER_PORT` | `0.0.0.0` / `8080` |
//! | `A2A_ENABLE`, `A2A_EXPOSE` | `false` |
//! | `A2A_AGENTS` | empty (comma-separated URLs) |
//! | `A2A_CLIENT_TIMEOUT` | `30s` |
//! | `A2A_SERVICE_DISCOVERY_ENABLE` | `false` |
//! | `A2A_SERVICE_DISCOVERY_NAMESPACE` | pod namespace file, else `default` |
//! | `A2A_SERVICE_DISCOVERY_LABEL_SELECTOR` | `inference-gateway.com/a2a-agent=true` |
//! | `MCP_ENABLE` | `false` |
//! | `MCP_SERVERS` | empty (comma-separated URLs) |
//! | `MCP_CLIENT_TIMEOUT` | `30s` |
//! | `MAX_AGENT_ITERATIONS` | `10` |
//! | `<PROVIDER>_API_KEY`, `<PROVIDER>_URL` | unset |

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::gateway::error::GatewayError;
use crate::gateway::providers::registry::ProviderId;

const POD_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const DEFAULT_LABEL_SELECTOR: &str = "inference-gateway.com/a2a-agent=true";

/// Credentials and base-URL override for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub url: Option<String>,
}

/// A2A agent integration knobs.
#[derive(Debug, Clone)]
pub struct A2aConfig {
    pub enable: bool,
    /// Whether discovered agents are surfaced to inbound clients.
    pub expose: bool,
    pub agents: Vec<String>,
    pub client_timeout: Duration,
    pub service_discovery_enable: bool,
    pub service_discovery_namespace: String,
    pub service_discovery_label_selector: String,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            enable: false,
            expose: false,
            agents: Vec::new(),
            client_timeout: Duration::from_secs(30),
            service_discovery_enable: false,
            service_discovery_namespace: "default".to_string(),
            service_discovery_label_selector: DEFAULT_LABEL_SELECTOR.to_string(),
        }
    }
}

/// MCP tool-server integration knobs.
#[derive(Debug, Clone)]
pub struct McpConfig {
    pub enable: bool,
    pub servers: Vec<String>,
    pub client_timeout: Duration,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            enable: false,
            servers: Vec::new(),
            client_timeout: Duration::from_secs(30),
        }
    }
}

/// Listen address of the HTTP surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub a2a: A2aConfig,
    pub mcp: McpConfig,
    pub max_agent_iterations: u32,
    providers: HashMap<ProviderId, ProviderSettings>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            a2a: A2aConfig::default(),
            mcp: McpConfig::default(),
            max_agent_iterations: 10,
            providers: ProviderId::ALL
                .iter()
                .map(|id| (*id, ProviderSettings::default()))
                .collect(),
        }
    }
}

impl GatewayConfig {
    /// Read the whole configuration from the process environment.
    ///
    /// Fails only on values that cannot be interpreted at all (a malformed
    /// port, a zero iteration budget); unset variables fall back to their
    /// defaults.
    pub fn from_env() -> Result<Self, GatewayError> {
        let mut cfg = GatewayConfig::default();

        if let Some(host) = read("SERVER_HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = read("SERVER_PORT") {
            cfg.server.port = port
                .parse()
                .map_err(|_| GatewayError::Config(format!("invalid SERVER_PORT: {}", port)))?;
        }

        cfg.a2a.enable = read_bool("A2A_ENABLE", cfg.a2a.enable);
        cfg.a2a.expose = read_bool("A2A_EXPOSE", cfg.a2a.expose);
        cfg.a2a.agents = read_list("A2A_AGENTS");
        cfg.a2a.client_timeout = read_duration("A2A_CLIENT_TIMEOUT", cfg.a2a.client_timeout)?;
        cfg.a2a.service_discovery_enable =
            read_bool("A2A_SERVICE_DISCOVERY_ENABLE", cfg.a2a.service_discovery_enable);
        cfg.a2a.service_discovery_namespace = read("A2A_SERVICE_DISCOVERY_NAMESPACE")
            .unwrap_or_else(pod_namespace);
        if let Some(selector) = read("A2A_SERVICE_DISCOVERY_LABEL_SELECTOR") {
            cfg.a2a.service_discovery_label_selector = selector;
        }

        cfg.mcp.enable = read_bool("MCP_ENABLE", cfg.mcp.enable);
        cfg.mcp.servers = read_list("MCP_SERVERS");
        cfg.mcp.client_timeout = read_duration("MCP_CLIENT_TIMEOUT", cfg.mcp.client_timeout)?;

        if let Some(raw) = read("MAX_AGENT_ITERATIONS") {
            let n: u32 = raw.parse().map_err(|_| {
                GatewayError::Config(format!("invalid MAX_AGENT_ITERATIONS: {}", raw))
            })?;
            if n == 0 {
                return Err(GatewayError::Config(
                    "MAX_AGENT_ITERATIONS must be at least 1".to_string(),
                ));
            }
            cfg.max_agent_iterations = n;
        }

        for id in ProviderId::ALL {
            let settings = ProviderSettings {
                api_key: read(&format!("{}_API_KEY", id.env_prefix())),
                url: read(&format!("{}_URL", id.env_prefix())),
            };
            cfg.providers.insert(id, settings);
        }

        Ok(cfg)
    }

    /// Settings for one provider (always present, possibly empty).
    pub fn provider(&self, id: ProviderId) -> &ProviderSettings {
        self.providers
            .get(&id)
            .expect("every provider id is seeded at construction")
    }

    /// Override one provider's settings (used by tests and embedders).
    pub fn set_provider(&mut self, id: ProviderId, settings: ProviderSettings) {
        self.providers.insert(id, settings);
    }
}

fn read(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_bool(name: &str, default: bool) -> bool {
    match read(name) {
        None => default,
        Some(raw) => match parse_bool(&raw) {
            Some(value) => value,
            None => {
                log::warn!("{}: unrecognized boolean '{}', using {}", name, raw, default);
                default
            }
        },
    }
}

fn read_list(name: &str) -> Vec<String> {
    read(name)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn read_duration(name: &str, default: Duration) -> Result<Duration, GatewayError> {
    match read(name) {
        None => Ok(default),
        Some(raw) => parse_duration(&raw)
            .ok_or_else(|| GatewayError::Config(format!("invalid duration for {}: {}", name, raw))),
    }
}

/// Parse `1500ms`, `30s`, `2m`, `1h`, or a bare integer (seconds).
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit): (&str, &str) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => raw.split_at(pos),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn pod_namespace() -> String {
    std::fs::read_to_string(POD_NAMESPACE_FILE)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_all_supported_units() {
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10d"), None);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for raw in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(raw), Some(true), "raw {}", raw);
        }
        for raw in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(raw), Some(false), "raw {}", raw);
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn default_config_seeds_every_provider() {
        let cfg = GatewayConfig::default();
        for id in ProviderId::ALL {
            assert!(cfg.provider(id).api_key.is_none());
        }
        assert_eq!(cfg.max_agent_iterations, 10);
        assert_eq!(cfg.a2a.client_timeout, Duration::from_secs(30));
    }
}
