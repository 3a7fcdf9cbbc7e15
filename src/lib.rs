//! spotd — offline build-agent watchdog.
//!
//! Polls one or more CI backends (Jenkins, Bamboo) on an interval, remembers
//! which agents were already offline on the previous pass, and forwards only
//! the *newly* offline agents to a notification webhook. All cross-cycle
//! state lives in [`cache::OfflineAgentCache`]; everything else is a thin
//! adapter around one backend API or one delivery channel.

pub mod cache;
pub mod config;
pub mod notify;
pub mod source;
pub mod watchdog;
