//! Shared application state for the relay
//!
//! All mutable registries (cache, subscriptions, counters) are explicitly
//! owned here, created at process start and dropped at shutdown — never
//! free-floating globals. Handlers and the ingest task share it behind an
//! `Arc`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::SnapshotCache;
use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use crate::registry::SubscriptionRegistry;

pub struct RelayState {
    pub config: RelayConfig,
    pub cache: RwLock<SnapshotCache>,
    pub registry: RwLock<SubscriptionRegistry>,
    pub metrics: Arc<RelayMetrics>,
}

pub type SharedState = Arc<RelayState>;

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        let cache = SnapshotCache::new(config.cache_ttl_ms, config.cache_capacity);
        let registry = SubscriptionRegistry::new(config.max_subscriptions_per_session);
        Self {
            config,
            cache: RwLock::new(cache),
            registry: RwLock::new(registry),
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    pub fn shared(config: RelayConfig) -> SharedState {
        Arc::new(Self::new(config))
    }
}
