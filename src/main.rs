// src/main.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use llm_gateway::gateway::a2a::client::A2aClient;
use llm_gateway::gateway::a2a::discovery::discover_agent_urls;
use llm_gateway::gateway::config::GatewayConfig;
use llm_gateway::gateway::mcp::client::McpClient;
use llm_gateway::gateway::providers::registry::ProviderRegistry;
use llm_gateway::gateway::server::{router, AppState};

#[tokio::main]
async fn main() {
    llm_gateway::init_logger();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let registry = Arc::new(ProviderRegistry::from_config(&config));
    if registry.is_empty() {
        log::warn!("no providers configured; set <PROVIDER>_API_KEY variables to register upstreams");
    } else {
        log::info!(
            "registered providers: {}",
            registry
                .ids()
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let agents = if config.a2a.enable {
        let urls = discover_agent_urls(&config.a2a).await;
        log::info!("A2A enabled with {} agent(s)", urls.len());
        urls
    } else {
        Vec::new()
    };
    let a2a = config
        .a2a
        .enable
        .then(|| Arc::new(A2aClient::new(config.a2a.client_timeout)));

    let mcp = if config.mcp.enable && !config.mcp.servers.is_empty() {
        let mut client = McpClient::new(config.mcp.servers.clone(), config.mcp.client_timeout);
        let startup = CancellationToken::new();
        let initialized = client.initialize_all(&startup).await;
        if initialized > 0 {
            match client.discover_capabilities(&startup).await {
                Ok(tools) => log::info!(
                    "MCP enabled: {} server(s), {} tool(s)",
                    initialized,
                    tools.len()
                ),
                Err(err) => log::warn!("MCP tool discovery failed: {}", err),
            }
            Some(Arc::new(client))
        } else {
            log::warn!("MCP enabled but no server completed the handshake");
            None
        }
    } else {
        None
    };

    let state = AppState {
        registry,
        config: Arc::new(config.clone()),
        a2a,
        agents: Arc::new(agents),
        mcp,
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("failed to bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };
    log::info!("listening on {}", addr);

    if let Err(err) = axum::serve(listener, app).await {
        log::error!("server error: {}", err);
        std::process::exit(1);
    }
}
