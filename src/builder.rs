//! Builder API for assembling a cache from tiers.

use std::sync::Arc;

use crate::cache::TagCache;
use crate::store::Store;
use crate::wrapper::WrapperConfig;

/// Builder for creating a [`TagCache`] from one or more store tiers.
///
/// Tiers are checked in the order they are added.
///
/// # Example
///
/// ```ignore
/// use tag_cache::{CacheBuilder, MokaStore, MokaStoreConfig, RedisStore, RedisStoreConfig};
/// use std::sync::Arc;
///
/// let memory = Arc::new(MokaStore::new(MokaStoreConfig::default()));
/// let redis = if enable_redis {
///     Some(Arc::new(RedisStore::new(RedisStoreConfig::default()).await?) as _)
/// } else {
///     None
/// };
///
/// let cache = CacheBuilder::new()
///     .tier(memory)
///     .optional_tier(redis)
///     .single_flight(true)
///     .build();
/// ```
pub struct CacheBuilder {
    stores: Vec<Option<Arc<dyn Store>>>,
    config: WrapperConfig,
}

impl CacheBuilder {
    /// Create a new CacheBuilder.
    pub fn new() -> Self {
        CacheBuilder {
            stores: Vec::new(),
            config: WrapperConfig::default(),
        }
    }

    /// Add a store tier.
    pub fn tier(mut self, store: Arc<dyn Store>) -> Self {
        self.stores.push(Some(store));
        self
    }

    /// Add a tier that may be disabled. `None` is skipped.
    pub fn optional_tier(mut self, store: Option<Arc<dyn Store>>) -> Self {
        self.stores.push(store);
        self
    }

    /// Replace the options for wrapped reads.
    pub fn wrapper_config(mut self, config: WrapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable coalescing of concurrent misses.
    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.config.single_flight = enabled;
        self
    }

    /// Build the cache.
    pub fn build(self) -> TagCache {
        let tiers = self.stores.iter().flatten().count();
        tracing::debug!(
            "Building cache: tiers={}, single_flight={}",
            tiers,
            self.config.single_flight
        );
        TagCache::with_optional_stores(self.stores, self.config)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
