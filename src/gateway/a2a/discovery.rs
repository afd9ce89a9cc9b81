//! A2A agent discovery.
//!
//! Two sources feed the agent URL list: the static `A2A_AGENTS`
//! configuration, used verbatim, and (behind the `cluster-discovery`
//! feature) Kubernetes Services selected by label, each resolved to a base
//! URL.

use crate::gateway::config::A2aConfig;

/// Resolve the full set of agent base URLs for this configuration.
///
/// Static URLs come first; cluster-discovered URLs are appended,
/// deduplicated against the static list.  Discovery failures degrade to the
/// static list with a warning.
pub async fn discover_agent_urls(cfg: &A2aConfig) -> Vec<String> {
    let mut urls = cfg.agents.clone();

    #[cfg(feature = "cluster-discovery")]
    if cfg.service_discovery_enable {
        match cluster::discover(
            &cfg.service_discovery_namespace,
            &cfg.service_discovery_label_selector,
        )
        .await
        {
            Ok(found) => {
                for url in found {
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
            Err(err) => {
                log::warn!("cluster agent discovery failed: {}", err);
            }
        }
    }

    #[cfg(not(feature = "cluster-discovery"))]
    if cfg.service_discovery_enable {
        log::warn!(
            "A2A_SERVICE_DISCOVERY_ENABLE is set but this build lacks the cluster-discovery feature"
        );
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::A2aConfig;

    #[tokio::test]
    async fn static_urls_are_used_verbatim() {
        let cfg = A2aConfig {
            agents: vec!["http://calc:8080".to_string(), "http://hello:8080".to_string()],
            ..Default::default()
        };
        assert_eq!(
            discover_agent_urls(&cfg).await,
            vec!["http://calc:8080", "http://hello:8080"]
        );
    }
}

#[cfg(feature = "cluster-discovery")]
pub mod cluster {
    //! Label-selector based discovery of agent Services in a cluster.

    use k8s_openapi::api::core::v1::Service;
    use kube::api::ListParams;
    use kube::{Api, Client};

    use crate::gateway::error::GatewayError;

    /// Annotation overriding the derived URL entirely.
    pub const URL_ANNOTATION: &str = "inference-gateway.com/a2a-url";

    /// Annotation naming the port when the Service declares several.
    pub const PORT_ANNOTATION: &str = "inference-gateway.com/a2a-port";

    /// Port names recognized without further configuration.
    const WELL_KNOWN_PORT_NAMES: [&str; 3] = ["a2a", "agent", "http"];

    const FALLBACK_PORT: i32 = 8080;

    /// List matching Services and derive one base URL per usable Service.
    pub async fn discover(
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let client = Client::try_default()
            .await
            .map_err(|e| GatewayError::Network(format!("kubernetes client: {}", e)))?;
        let services: Api<Service> = Api::namespaced(client, namespace);
        let list = services
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| GatewayError::Network(format!("service list: {}", e)))?;

        Ok(list
            .items
            .iter()
            .filter_map(|svc| service_base_url(svc, namespace))
            .collect())
    }

    /// Derive the base URL for one Service.
    ///
    /// Priority: the URL annotation; then cluster-internal DNS for
    /// ClusterIP/NodePort Services; then the LoadBalancer ingress address
    /// when one is ready, falling back to DNS otherwise.  Services with no
    /// resolvable port are skipped with a warning.
    pub fn service_base_url(svc: &Service, namespace: &str) -> Option<String> {
        let name = svc.metadata.name.as_deref()?;

        if let Some(url) = svc
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(URL_ANNOTATION))
        {
            return Some(url.trim_end_matches('/').to_string());
        }

        let port = match select_port(svc) {
            Some(port) => port,
            None => {
                log::warn!(
                    "service {}/{} has no usable agent port; skipping",
                    namespace,
                    name
                );
                return None;
            }
        };

        let dns_url = format!("http://{}.{}.svc.cluster.local:{}", name, namespace, port);

        let service_type = svc.spec.as_ref().and_then(|s| s.type_.as_deref());
        if service_type == Some("LoadBalancer") {
            let ingress_host = svc
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .and_then(|ingress| ingress.first())
                .and_then(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()));
            if let Some(host) = ingress_host {
                return Some(format!("http://{}:{}", host, port));
            }
        }

        Some(dns_url)
    }

    /// Pick the agent port: a well-known named port, the annotated port, the
    /// sole declared port, or a declared 8080, in that order.
    fn select_port(svc: &Service) -> Option<i32> {
        let ports = svc.spec.as_ref()?.ports.as_ref()?;
        if ports.is_empty() {
            return None;
        }

        for port in ports {
            if let Some(name) = port.name.as_deref() {
                if WELL_KNOWN_PORT_NAMES.contains(&name) {
                    return Some(port.port);
                }
            }
        }

        if let Some(annotated) = svc
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(PORT_ANNOTATION))
            .and_then(|raw| raw.parse::<i32>().ok())
        {
            return Some(annotated);
        }

        if ports.len() == 1 {
            return Some(ports[0].port);
        }

        if ports.iter().any(|p| p.port == FALLBACK_PORT) {
            return Some(FALLBACK_PORT);
        }

        None
    }

}
