// src/lib.rs

// Import the top-level `gateway` module.
pub mod gateway;

// Re-exporting key items for easier external access.
pub use gateway::config::GatewayConfig;
pub use gateway::error::GatewayError;
pub use gateway::providers::client::{ChatClient, ProviderClient};
pub use gateway::providers::registry::{ProviderId, ProviderRegistry};
pub use gateway::schema::{ChatCompletionRequest, ChatCompletionResponse, Message, Role};

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// Initialize the `env_logger` backend exactly once.
///
/// Safe to call from every test and from `main`; repeated calls are no-ops.
pub fn init_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env().try_init();
    });
}
