//! Offline-state reconciliation — converts a raw "currently offline" snapshot
//! per polling cycle into a "newly offline since last cycle" delta.
//!
//! The cache is the only stateful piece of the daemon. It is owned by the
//! watchdog and mutated exclusively through [`OfflineAgentCache::update`],
//! which is called exactly once per cycle from the single loop task — no
//! locking needed.

use std::collections::{HashMap, HashSet};

/// Per-cycle view of currently offline agents, keyed by source name.
///
/// A source that reported no offline agents, or that failed to answer this
/// cycle, has no entry at all.
pub type Snapshot = HashMap<String, Vec<String>>;

/// Agents that are offline now but were not offline as of the previous cycle,
/// keyed by source name. A source with nothing new is omitted entirely.
pub type Delta = HashMap<String, Vec<String>>;

/// Remembers which agents are still offline per source.
#[derive(Debug, Default)]
pub struct OfflineAgentCache {
    tracked: HashMap<String, HashSet<String>>,
}

impl OfflineAgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the cache against this cycle's snapshot and return the
    /// agents that are newly offline.
    ///
    /// Total over any snapshot, including the empty one (which clears all
    /// state and returns an empty delta). Per source, delta order follows
    /// the snapshot's report order. A source absent from the snapshot is
    /// dropped entirely — its "all clear" is implicit, never reported as a
    /// negative delta.
    pub fn update(&mut self, snapshot: &Snapshot) -> Delta {
        let mut delta = Delta::new();

        for (source, agents) in snapshot {
            let tracked = self.tracked.entry(source.clone()).or_default();

            // New agents go into tracking and into the delta; agents already
            // tracked stay silent.
            for agent in agents {
                if tracked.insert(agent.clone()) {
                    delta
                        .entry(source.clone())
                        .or_default()
                        .push(agent.clone());
                }
            }

            // Agents no longer in this cycle's list have recovered.
            tracked.retain(|agent| agents.iter().any(|a| a == agent));
        }

        // Sources that stopped reporting, or whose tracked set drained, are
        // retired wholesale.
        self.tracked
            .retain(|source, agents| snapshot.contains_key(source) && !agents.is_empty());

        delta
    }

    /// Whether any agent of `source` is currently tracked as offline.
    pub fn is_tracking(&self, source: &str) -> bool {
        self.tracked.contains_key(source)
    }

    /// True when no source has any tracked offline agent.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
