//! Shared HTTP client.
//!
//! A single pooled [`reqwest::Client`] keeps TLS sessions and DNS lookups
//! warm across every upstream the gateway talks to (providers, A2A agents,
//! MCP servers).  Per-call deadlines are applied by the callers; the shared
//! client only enforces a connect timeout so a stuck upstream cannot wedge
//! connection setup.

use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    static ref SHARED_HTTP_CLIENT: reqwest::Client = {
        reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build shared HTTP client")
    };
}

/// Borrow the lazily initialised shared [`reqwest::Client`].
pub fn shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}
