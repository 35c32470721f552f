use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;

use crate::broadcaster::{InvalidationBroadcaster, MutationOutcome, RevalidateScope};
use crate::error::CacheError;
use crate::store::Store;
use crate::tag::{ResourceKind, TagSet};
use crate::tiered::TieredStore;
use crate::wrapper::{CacheWrapper, CachedFn, WrapperConfig};

/// High-level cache API that combines a TieredStore with the read wrapper and
/// the invalidation broadcaster.
///
/// Both sides share one store, so whatever `wrap` caches, `revalidate` can drop.
/// Cloning is cheap and clones share the store.
#[derive(Clone)]
pub struct TagCache {
    store: Arc<dyn Store>,
    wrapper: CacheWrapper,
    broadcaster: InvalidationBroadcaster,
}

impl TagCache {
    /// Create a new TagCache over the given stores.
    ///
    /// # Arguments
    /// * `stores` - Stores to use (checked in order, first hit wins)
    /// * `config` - Options for wrapped reads
    ///
    /// # Example
    /// ```ignore
    /// let l1_store = Arc::new(MokaStore::new(MokaStoreConfig::default()));
    /// let l2_store = Arc::new(RedisStore::new(config).await?);
    ///
    /// let cache = TagCache::new(vec![l1_store, l2_store], WrapperConfig::default());
    /// ```
    pub fn new(stores: Vec<Arc<dyn Store>>, config: WrapperConfig) -> Self {
        Self::with_store(Arc::new(TieredStore::from_stores(stores)), config)
    }

    /// Create a new TagCache with optional stores (for dynamic configuration).
    ///
    /// `None` values are filtered out, allowing conditional store inclusion.
    pub fn with_optional_stores(stores: Vec<Option<Arc<dyn Store>>>, config: WrapperConfig) -> Self {
        Self::with_store(Arc::new(TieredStore::new(stores)), config)
    }

    /// Create a TagCache over a single, already assembled store.
    pub fn with_store(store: Arc<dyn Store>, config: WrapperConfig) -> Self {
        TagCache {
            wrapper: CacheWrapper::new(store.clone(), config),
            broadcaster: InvalidationBroadcaster::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn wrapper(&self) -> &CacheWrapper {
        &self.wrapper
    }

    pub fn broadcaster(&self) -> &InvalidationBroadcaster {
        &self.broadcaster
    }

    /// Wrap a read function. See [`CacheWrapper::wrap`].
    ///
    /// # Example
    /// ```ignore
    /// let tags = TagSet::try_from_tags([id_tag(&product_id, ResourceKind::Products)?])?;
    /// let product = cache
    ///     .wrap("get_product", tags, |id: String| async move { db.product(&id).await })
    ///     .call(product_id.clone())
    ///     .await?;
    /// ```
    pub fn wrap<A, V, E, F, Fut>(
        &self,
        identity: impl Into<String>,
        tags: TagSet,
        fetch: F,
    ) -> CachedFn<A, V, E, F>
    where
        A: Serialize,
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.wrapper.wrap(identity, tags, fetch)
    }

    /// Invalidate reads affected by a mutation. See [`InvalidationBroadcaster::revalidate`].
    pub async fn revalidate(
        &self,
        kind: ResourceKind,
        scope: &RevalidateScope<'_>,
    ) -> Result<usize, CacheError> {
        self.broadcaster.revalidate(kind, scope).await
    }

    /// Invalidate only when `outcome` reports a change.
    pub async fn revalidate_after<O>(
        &self,
        outcome: &O,
        kind: ResourceKind,
        scope: &RevalidateScope<'_>,
    ) -> Result<usize, CacheError>
    where
        O: MutationOutcome + ?Sized,
    {
        self.broadcaster.revalidate_after(outcome, kind, scope).await
    }

    /// Drop every cached read in every tier.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.broadcaster.clear_all().await
    }
}
