//! Pluggable offline-agent sources.
//!
//! Each source knows how to talk to one build-system instance and report
//! which of its agents are currently offline. Heterogeneous backends
//! (different auth, different JSON shapes) are a flat set of interchangeable
//! [`AgentSource`] implementations registered into one list — no hierarchy.

pub mod bamboo;
pub mod jenkins;

use async_trait::async_trait;

/// A source query failed for this cycle. The watchdog logs it and moves on;
/// recovery is "try again next scheduled cycle".
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed: HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The basic unit of work for spotd. Each source knows how to determine
/// which agents of one monitored backend instance are offline.
#[async_trait]
pub trait AgentSource: Send + Sync {
    /// Stable identity of this source, formatted `[kind] endpoint`. The
    /// reconciliation cache keys on it, so it must not change for the life
    /// of the process.
    fn name(&self) -> String;

    /// Query the backend and return the agents currently offline, in the
    /// order the backend reported them.
    async fn find_offline_agents(&self) -> Result<Vec<String>, SourceError>;
}

/// Strip a single trailing `/` so `name()` and request URLs are stable
/// regardless of how the endpoint was written on the command line.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.strip_suffix('/').unwrap_or(endpoint).to_string()
}
