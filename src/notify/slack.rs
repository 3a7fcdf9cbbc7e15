//! Slack-compatible webhook notifier.
//!
//! Posts one JSON payload per cycle to an incoming-webhook URL. Works with
//! Slack, Mattermost, and Rocket.Chat webhooks (they share the payload
//! shape).

use super::{Notifier, NotifyError};
use crate::cache::Delta;
use crate::source::normalize_endpoint;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_USERNAME: &str = "spotd";

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
}

/// Render the delta as a Markdown bullet list, one section per source.
/// Sources are sorted so the same delta always renders the same message.
fn render_message(delta: &Delta) -> String {
    let mut message = String::from(":warning: One or more build agents are offline! :warning:\n");

    let mut sources: Vec<&String> = delta.keys().collect();
    sources.sort();

    for source in sources {
        message.push_str(&format!("\n* {source}"));
        for agent in &delta[source] {
            message.push_str(&format!("\n    * {agent}"));
        }
    }

    message
}

/// A [`Notifier`] posting to one Slack-compatible webhook endpoint.
pub struct SlackNotifier {
    endpoint: String,
    username: String,
    icon_url: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(
        endpoint: &str,
        username: Option<String>,
        icon_url: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            username: username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            icon_url,
            client,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, delta: &Delta) -> Result<(), NotifyError> {
        if delta.is_empty() {
            debug!("no agents are offline, not sending a notification");
            return Ok(());
        }

        let text = render_message(delta);
        let payload = SlackPayload {
            text: &text,
            username: Some(&self.username),
            icon_url: self.icon_url.as_deref(),
        };

        debug!(sources = delta.len(), "posting webhook notification");
        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        Ok(())
    }
}
