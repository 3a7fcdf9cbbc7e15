//! Notification sinks — deliver a newly-offline delta out of band.

pub mod slack;

use crate::cache::Delta;
use async_trait::async_trait;

/// Delivery failed. Propagated to the caller of the notify-wrapping cycle;
/// the cache mutation has already committed by then and is not rolled back,
/// so a failed delivery is not re-reported next cycle.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Warns interested parties about newly offline agents.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification covering the whole delta map. An empty delta
    /// is a no-op (the watchdog never sends one, but implementations must
    /// tolerate it).
    async fn notify(&self, delta: &Delta) -> Result<(), NotifyError>;
}
