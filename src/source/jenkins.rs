//! Jenkins offline-agent source.
//!
//! Polls the `computer` API of one Jenkins instance and reports nodes with
//! their `offline` flag set. Nodes are filtered through a `_class` allowlist
//! first so ephemeral/cloud agents that come and go by design never alert.

use super::{normalize_endpoint, AgentSource, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

const NODE_API_CALL: &str =
    "computer/api/json?tree=computer[displayName,offline,offlineCauseReason]";

/// Node classes that count as real, monitorable agents.
pub const DEFAULT_CLASS_ALLOWLIST: &[&str] = &["hudson.slaves.SlaveComputer"];

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(rename = "_class", default)]
    class: String,
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    offline: bool,
    #[serde(rename = "offlineCauseReason", default)]
    offline_cause_reason: String,
}

#[derive(Debug, Deserialize)]
struct ComputerSet {
    #[serde(default)]
    computer: Vec<Node>,
}

/// An [`AgentSource`] for one Jenkins instance. If credentials are provided,
/// API requests use HTTP basic auth (the password may be an access token).
pub struct JenkinsSource {
    endpoint: String,
    credentials: Option<(String, String)>,
    class_allowlist: Vec<String>,
    client: reqwest::Client,
}

impl JenkinsSource {
    pub fn new(
        endpoint: &str,
        credentials: Option<(String, String)>,
        class_allowlist: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            credentials,
            class_allowlist,
            client,
        }
    }

    async fn query_api(&self) -> Result<Vec<Node>, SourceError> {
        let url = format!("{}/{}", self.endpoint, NODE_API_CALL);
        let mut request = self.client.get(&url);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let body = response.text().await?;
        let parsed: ComputerSet = serde_json::from_str(&body)?;
        Ok(parsed.computer)
    }
}

/// Pick the offline, allowlisted display names out of a node list, keeping
/// the backend's report order.
fn collect_offline(source: &str, nodes: &[Node], allowlist: &[String]) -> Vec<String> {
    let mut offline = Vec::new();

    for node in nodes {
        if !allowlist.iter().any(|class| *class == node.class) {
            debug!(
                source = %source,
                agent = %node.display_name,
                class = %node.class,
                "skipping agent (class not allowlisted)"
            );
        } else if node.offline {
            warn!(
                source = %source,
                agent = %node.display_name,
                reason = %node.offline_cause_reason,
                "found an offline agent"
            );
            offline.push(node.display_name.clone());
        } else {
            debug!(source = %source, agent = %node.display_name, "node is online");
        }
    }

    offline
}

#[async_trait]
impl AgentSource for JenkinsSource {
    fn name(&self) -> String {
        format!("[jenkins] {}", self.endpoint)
    }

    async fn find_offline_agents(&self) -> Result<Vec<String>, SourceError> {
        let nodes = self.query_api().await?;
        if nodes.is_empty() {
            warn!(source = %self.name(), "no agents found");
        }

        Ok(collect_offline(&self.name(), &nodes, &self.class_allowlist))
    }
}
