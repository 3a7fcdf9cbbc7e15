//! The per-cycle orchestrator.
//!
//! One cycle = query every source, merge the successes into a snapshot,
//! reconcile through the cache, and notify if anything is newly offline.
//! The watchdog itself is stateless between cycles; all cross-cycle memory
//! lives in the owned [`OfflineAgentCache`].

use crate::cache::{Delta, OfflineAgentCache, Snapshot};
use crate::notify::{Notifier, NotifyError};
use crate::source::AgentSource;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Watchdog {
    sources: Vec<Arc<dyn AgentSource>>,
    notifier: Option<Arc<dyn Notifier>>,
    cache: OfflineAgentCache,
}

impl Watchdog {
    pub fn new(sources: Vec<Arc<dyn AgentSource>>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            sources,
            notifier,
            cache: OfflineAgentCache::new(),
        }
    }

    /// Run one polling cycle and return the newly-offline delta.
    ///
    /// Sources are queried concurrently; a failing source is logged and
    /// contributes nothing this cycle, which the cache treats as "reported
    /// nothing offline" — its tracked agents are dropped, and a later
    /// successful cycle re-reports them as new. Never fails.
    pub async fn run_cycle(&mut self) -> Delta {
        debug!(sources = self.sources.len(), "running watchdog cycle");

        let queries = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let name = source.name();
                let result = source.find_offline_agents().await;
                (name, result)
            }
        });

        let mut snapshot = Snapshot::new();
        for (name, result) in join_all(queries).await {
            match result {
                Ok(offline) if offline.is_empty() => {
                    debug!(source = %name, "no offline agents");
                }
                Ok(offline) => {
                    warn!(source = %name, offline = ?offline, "one or more agents are offline");
                    // Two sources sharing a name merge under one key.
                    snapshot.entry(name).or_default().extend(offline);
                }
                Err(err) => {
                    error!(source = %name, err = %err, "failed to check for offline agents");
                }
            }
        }

        self.cache.update(&snapshot)
    }

    /// Run one cycle and, if any agents are newly offline, deliver exactly
    /// one notification covering the full delta.
    ///
    /// Only the delivery step can fail. By the time it runs the cache has
    /// already committed, so a failed delivery is not retried and the same
    /// delta is not reported again next cycle.
    pub async fn run_cycle_and_notify(&mut self) -> Result<(), NotifyError> {
        let delta = self.run_cycle().await;

        if delta.is_empty() {
            info!("no newly offline agents");
            return Ok(());
        }

        match &self.notifier {
            Some(notifier) => {
                info!(
                    sources = delta.len(),
                    agents = delta.values().map(Vec::len).sum::<usize>(),
                    "sending notification"
                );
                notifier.notify(&delta).await
            }
            None => {
                error!("no notifier configured, dropping notification");
                Ok(())
            }
        }
    }
}
