use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kairos_errors::{KairosError, KairosResult};
use serde::{Deserialize, Serialize};

/// A resolved peer agent endpoint (§4.10 "Discovery").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    pub agent_id: String,
    pub url: String,
}

/// One of the three pluggable discovery providers (§4.10).
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>>;
}

/// Static list from configuration (`discovery.order` includes `"config"`).
pub struct ConfigDiscoveryProvider {
    endpoints: Vec<AgentEndpoint>,
}

impl ConfigDiscoveryProvider {
    pub fn new(endpoints: Vec<AgentEndpoint>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl DiscoveryProvider for ConfigDiscoveryProvider {
    fn name(&self) -> &str {
        "config"
    }

    async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
        Ok(self.endpoints.iter().find(|e| e.agent_id == agent_id).cloned())
    }
}

/// Fetches `GET <base>/.well-known/agent-card.json` and reads the `name`
/// and declared endpoint off the published `AgentCard` (§4.10, §6).
pub struct WellKnownDiscoveryProvider {
    client: reqwest::Client,
    base_url: String,
}

impl WellKnownDiscoveryProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DiscoveryProvider for WellKnownDiscoveryProvider {
    fn name(&self) -> &str {
        "well-known"
    }

    async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
        let url = format!("{}/.well-known/agent-card.json", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KairosError::internal("well-known discovery request failed").with_cause(e))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let card: kairos_protocol::AgentCard = response
            .json()
            .await
            .map_err(|e| KairosError::internal("well-known discovery returned invalid agent card").with_cause(e))?;

        if card.name != agent_id {
            return Ok(None);
        }
        Ok(card.endpoints.first().map(|endpoint| AgentEndpoint {
            agent_id: card.name.clone(),
            url: endpoint.clone(),
        }))
    }
}

/// Opt-in external registry with an optional bearer token and optional
/// auto-register + heartbeat (§4.10, §6 `discovery.{registry_url,
/// registry_token, auto_register, heartbeat_seconds}`).
pub struct RegistryDiscoveryProvider {
    client: reqwest::Client,
    registry_url: String,
    token: Option<String>,
}

impl RegistryDiscoveryProvider {
    pub fn new(registry_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url: registry_url.into(),
            token,
        }
    }

    /// Registers this agent's own card with the registry and spawns a
    /// background heartbeat; returns the heartbeat task handle so the
    /// caller can abort it on shutdown.
    pub fn auto_register(
        self: &Arc<Self>,
        card: kairos_protocol::AgentCard,
        heartbeat: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let mut request = provider
                    .client
                    .post(format!("{}/register", provider.registry_url.trim_end_matches('/')))
                    .json(&card);
                if let Some(token) = &provider.token {
                    request = request.bearer_auth(token);
                }
                if let Err(err) = request.send().await {
                    tracing::warn!(%err, "registry heartbeat failed");
                }
                tokio::time::sleep(heartbeat).await;
            }
        })
    }
}

#[async_trait]
impl DiscoveryProvider for RegistryDiscoveryProvider {
    fn name(&self) -> &str {
        "registry"
    }

    async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
        let url = format!("{}/agents/{agent_id}", self.registry_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| KairosError::internal("registry discovery request failed").with_cause(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Ok(None);
        }
        let endpoint: AgentEndpoint = response
            .json()
            .await
            .map_err(|e| KairosError::internal("registry discovery returned invalid payload").with_cause(e))?;
        Ok(Some(endpoint))
    }
}

/// Queries providers in a configurable order and returns the first match
/// (§4.10, §8 "discovery ordering"). Default order is config → well-known →
/// registry.
pub struct Resolver {
    providers: Vec<Arc<dyn DiscoveryProvider>>,
}

impl Resolver {
    pub fn new(providers: Vec<Arc<dyn DiscoveryProvider>>) -> Self {
        Self { providers }
    }

    pub async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
        for provider in &self.providers {
            if let Some(endpoint) = provider.resolve(agent_id).await? {
                return Ok(Some(endpoint));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolver_returns_first_provider_hit_regardless_of_later_providers() {
        struct AlwaysHit(&'static str);
        #[async_trait]
        impl DiscoveryProvider for AlwaysHit {
            fn name(&self) -> &str {
                "always-hit"
            }
            async fn resolve(&self, agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
                Ok(Some(AgentEndpoint {
                    agent_id: agent_id.to_owned(),
                    url: self.0.to_owned(),
                }))
            }
        }
        struct NeverHit;
        #[async_trait]
        impl DiscoveryProvider for NeverHit {
            fn name(&self) -> &str {
                "never-hit"
            }
            async fn resolve(&self, _agent_id: &str) -> KairosResult<Option<AgentEndpoint>> {
                panic!("should not be queried once an earlier provider hits")
            }
        }

        let resolver = Resolver::new(vec![Arc::new(AlwaysHit("https://a.example")), Arc::new(NeverHit)]);
        let endpoint = resolver.resolve("peer-agent").await.unwrap().unwrap();
        assert_eq!(endpoint.url, "https://a.example");
    }

    #[tokio::test]
    async fn config_provider_resolves_by_agent_id() {
        let provider = ConfigDiscoveryProvider::new(vec![AgentEndpoint {
            agent_id: "peer".to_owned(),
            url: "https://peer.example".to_owned(),
        }]);
        assert!(provider.resolve("peer").await.unwrap().is_some());
        assert!(provider.resolve("missing").await.unwrap().is_none());
    }
}
