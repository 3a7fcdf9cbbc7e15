//! Bamboo offline-agent source.
//!
//! Polls the remote-agent API of one Bamboo instance and reports agents whose
//! `active` flag is false (no live connection to the server).

use super::{normalize_endpoint, AgentSource, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

const AGENT_API_CALL: &str = "rest/api/latest/agent";

#[derive(Debug, Deserialize)]
struct Agent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    active: bool,
}

/// An [`AgentSource`] for one Bamboo instance. If credentials are provided,
/// API requests use HTTP basic auth (the password may be an access token).
pub struct BambooSource {
    endpoint: String,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
}

impl BambooSource {
    pub fn new(
        endpoint: &str,
        credentials: Option<(String, String)>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            credentials,
            client,
        }
    }

    async fn query_api(&self) -> Result<Vec<Agent>, SourceError> {
        let url = format!("{}/{}", self.endpoint, AGENT_API_CALL);
        let mut request = self.client.get(&url);
        if let Some((user, pass)) = &self.credentials {
            debug!(source = %self.name(), user = %user, "using basic auth");
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let body = response.text().await?;
        let parsed: Vec<Agent> = serde_json::from_str(&body)?;
        Ok(parsed)
    }
}

/// Inactive agents in report order.
fn collect_offline(source: &str, agents: &[Agent]) -> Vec<String> {
    let mut offline = Vec::new();

    for agent in agents {
        if !agent.active {
            warn!(source = %source, agent = %agent.name, "found an offline agent");
            offline.push(agent.name.clone());
        } else {
            debug!(source = %source, agent = %agent.name, "agent is online");
        }
    }

    offline
}

#[async_trait]
impl AgentSource for BambooSource {
    fn name(&self) -> String {
        format!("[bamboo] {}", self.endpoint)
    }

    async fn find_offline_agents(&self) -> Result<Vec<String>, SourceError> {
        let agents = self.query_api().await?;
        if agents.is_empty() {
            warn!(source = %self.name(), "no agents found");
        }

        Ok(collect_offline(&self.name(), &agents))
    }
}
