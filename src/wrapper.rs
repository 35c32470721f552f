use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::entry::{StorageMode, StoredEntry};
use crate::key::CacheKey;
use crate::store::Store;
use crate::tag::{CacheTag, TagSet};
use crate::utils::now_ms;

/// Options for wrapped reads.
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// Coalesce concurrent misses on the same key so only one of them
    /// invokes the origin. The others wait and then read what it stored.
    pub single_flight: bool,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        WrapperConfig {
            single_flight: true,
        }
    }
}

/// Per-key locks for misses that are currently loading.
#[derive(Clone, Default)]
struct InFlight {
    locks: Arc<Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>>,
}

impl InFlight {
    async fn acquire(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    async fn release(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        // Only the map holds it now, and nobody can clone it without the map lock.
        if let Some(existing) = locks.get(key)
            && Arc::strong_count(existing) == 1
        {
            locks.remove(key);
        }
    }
}

/// Wraps read functions so their results are cached under a set of tags.
///
/// # Example
/// ```ignore
/// let wrapper = CacheWrapper::new(store, WrapperConfig::default());
///
/// let tags = TagSet::try_from_tags([user_tag(&user_id, ResourceKind::Products)?])?;
/// let get_products = wrapper.wrap("get_products", tags, |(user_id, limit)| async move {
///     db.products_for_user(&user_id, limit).await
/// });
///
/// let products = get_products.call((user_id, Some(6))).await?;
/// ```
#[derive(Clone)]
pub struct CacheWrapper {
    store: Arc<dyn Store>,
    config: WrapperConfig,
    in_flight: InFlight,
}

impl CacheWrapper {
    pub fn new(store: Arc<dyn Store>, config: WrapperConfig) -> Self {
        CacheWrapper {
            store,
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Wrap `fetch` under `identity`.
    ///
    /// The identity names the query: two wrapped functions must not share one
    /// unless they compute the same thing from the same arguments. An empty
    /// tag set yields a function that never caches.
    pub fn wrap<A, V, E, F, Fut>(
        &self,
        identity: impl Into<String>,
        tags: TagSet,
        fetch: F,
    ) -> CachedFn<A, V, E, F>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        CachedFn {
            identity: identity.into(),
            tags: tags.to_set(),
            store: self.store.clone(),
            single_flight: self.config.single_flight,
            in_flight: self.in_flight.clone(),
            fetch,
            _marker: PhantomData,
        }
    }
}

/// A read function whose results are cached until one of its tags is invalidated.
pub struct CachedFn<A, V, E, F> {
    identity: String,
    tags: BTreeSet<CacheTag>,
    store: Arc<dyn Store>,
    single_flight: bool,
    in_flight: InFlight,
    fetch: F,
    _marker: PhantomData<fn(A) -> Result<V, E>>,
}

impl<A, V, E, F, Fut> CachedFn<A, V, E, F>
where
    A: Serialize,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<V, E>>,
{
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn tags(&self) -> &BTreeSet<CacheTag> {
        &self.tags
    }

    /// The key a call with `args` is cached under.
    pub fn key_for(&self, args: &A) -> Result<CacheKey, crate::error::CacheError> {
        CacheKey::derive(&self.identity, args)
    }

    /// Return the cached value for `args`, or fetch, cache and return it.
    ///
    /// Fetch errors are returned unchanged and never cached. Store failures
    /// never surface here: they degrade to a miss.
    pub async fn call(&self, args: A) -> Result<V, E> {
        if self.tags.is_empty() {
            return (self.fetch)(args).await;
        }

        let key = match self.key_for(&args) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    "Cannot derive cache key, bypassing cache: identity={}, error={}",
                    self.identity,
                    e
                );
                return (self.fetch)(args).await;
            }
        };

        if let Some(value) = self.lookup(&key).await {
            return Ok(value);
        }

        if !self.single_flight {
            return self.fetch_and_store(&key, args).await;
        }

        let lock = self.in_flight.acquire(&key).await;
        let result = {
            let _guard = lock.lock().await;
            // Whoever held the lock before us may have stored it already.
            match self.lookup(&key).await {
                Some(value) => Ok(value),
                None => self.fetch_and_store(&key, args).await,
            }
        };
        self.in_flight.release(&key, lock).await;

        result
    }

    async fn lookup(&self, key: &CacheKey) -> Option<V> {
        match self.store.get(key).await {
            Ok(Some(stored)) => match stored.into_typed::<V>() {
                Ok(entry) => {
                    tracing::debug!("Cache hit: tier={}, key={}", self.store.name(), key);
                    Some(entry.value)
                }
                Err(e) => {
                    tracing::warn!(
                        "Unreadable cache entry, treating as miss: tier={}, key={}, error={}",
                        self.store.name(),
                        key,
                        e
                    );
                    None
                }
            },
            Ok(None) => {
                tracing::debug!("Cache miss: tier={}, key={}", self.store.name(), key);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Cache read failed, loading from origin: tier={}, key={}, error={}",
                    self.store.name(),
                    key,
                    e
                );
                None
            }
        }
    }

    async fn fetch_and_store(&self, key: &CacheKey, args: A) -> Result<V, E> {
        let value = (self.fetch)(args).await?;

        let now = now_ms();
        let entry = match self.store.storage_mode() {
            StorageMode::Typed => {
                StoredEntry::from_typed_with_serializer(value.clone(), self.tags.clone(), now)
            }
            StorageMode::Serialized => match StoredEntry::serialize(&value, self.tags.clone(), now)
            {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping cache write: key={}, error={}", key, e);
                    return Ok(value);
                }
            },
        };

        if let Err(e) = self.store.put(key, entry).await {
            tracing::warn!(
                "Cache write failed: tier={}, key={}, error={}",
                self.store.name(),
                key,
                e
            );
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use crate::tag::{ResourceKind, global_tag, user_tag};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_store() -> Arc<dyn Store> {
        Arc::new(HashMapStore::new(HashMapStoreConfig::default()))
    }

    fn products_of(user_id: &str) -> TagSet {
        TagSet::try_from_tags([user_tag(user_id, ResourceKind::Products).unwrap()]).unwrap()
    }

    /// A store that is always unavailable.
    struct UnavailableStore;

    #[async_trait]
    impl Store for UnavailableStore {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
            Err(CacheError::operation("unavailable", key.as_str(), "connection refused"))
        }

        async fn put(&self, key: &CacheKey, _entry: StoredEntry) -> Result<(), CacheError> {
            Err(CacheError::operation("unavailable", key.as_str(), "connection refused"))
        }

        async fn drop_by_tags(&self, _tags: &[CacheTag]) -> Result<usize, CacheError> {
            Err(CacheError::operation("unavailable", "", "connection refused"))
        }

        async fn drop_all(&self) -> Result<(), CacheError> {
            Err(CacheError::operation("unavailable", "", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap("get_products", products_of("user-1"), move |user_id: String| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(vec![format!("{}-product", user_id)])
            }
        });

        let first = cached.call("user-1".to_string()).await.unwrap();
        let second = cached.call("user-1".to_string()).await.unwrap();

        assert_eq!(first, vec!["user-1-product".to_string()]);
        assert_eq!(first, second);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_args_are_cached_separately() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap(
            "get_products",
            products_of("user-1"),
            move |(user_id, limit): (String, Option<u32>)| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(format!("{}:{:?}", user_id, limit))
                }
            },
        );

        let six = cached.call(("user-1".to_string(), Some(6))).await.unwrap();
        let all = cached.call(("user-1".to_string(), None)).await.unwrap();

        assert_eq!(six, "user-1:Some(6)");
        assert_eq!(all, "user-1:None");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap("get_products", products_of("user-1"), move |_: String| {
            let count = count.clone();
            async move {
                // Fail the first time only.
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("database timeout".to_string())
                } else {
                    Ok(42u32)
                }
            }
        });

        let err = cached.call("user-1".to_string()).await.unwrap_err();
        assert_eq!(err, "database timeout");

        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_untagged_reads_are_never_cached() {
        let store = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let wrapper = CacheWrapper::new(store.clone(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap("get_countries", TagSet::new(), move |_: ()| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("countries".to_string())
            }
        });

        cached.call(()).await.unwrap();
        cached.call(()).await.unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_identity_isolates_queries() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let tags = products_of("user-1");

        let count_fn = wrapper.wrap("get_product_count", tags.clone(), |_: String| async {
            Ok::<_, String>(3usize)
        });
        let name_fn = wrapper.wrap("get_first_product_name", tags, |_: String| async {
            Ok::<_, String>("Widget".to_string())
        });

        assert_eq!(count_fn.call("user-1".to_string()).await.unwrap(), 3);
        assert_eq!(name_fn.call("user-1".to_string()).await.unwrap(), "Widget");
        assert_ne!(
            count_fn.key_for(&"user-1".to_string()).unwrap(),
            name_fn.key_for(&"user-1".to_string()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalidation_forces_refetch() {
        let store = memory_store();
        let wrapper = CacheWrapper::new(store.clone(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap("get_products", products_of("user-1"), move |_: String| {
            let count = count.clone();
            async move { Ok::<_, String>(count.fetch_add(1, Ordering::SeqCst) + 1) }
        });

        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), 1);

        // A different tag leaves the entry alone.
        store
            .drop_by_tags(&[global_tag(ResourceKind::Subscription)])
            .await
            .unwrap();
        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), 1);

        store
            .drop_by_tags(&[user_tag("user-1", ResourceKind::Products).unwrap()])
            .await
            .unwrap();
        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_open() {
        let wrapper = CacheWrapper::new(Arc::new(UnavailableStore), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = wrapper.wrap("get_products", products_of("user-1"), move |_: String| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("fresh".to_string())
            }
        });

        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), "fresh");
        assert_eq!(cached.call("user-1".to_string()).await.unwrap(), "fresh");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let tags = products_of("user-1");

        let as_text = wrapper.wrap("reused_identity", tags.clone(), |_: u8| async {
            Ok::<_, String>("text".to_string())
        });
        let as_number = wrapper.wrap("reused_identity", tags, |_: u8| async {
            Ok::<_, String>(7u64)
        });

        as_text.call(1).await.unwrap();
        assert_eq!(as_number.call(1).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_misses() {
        let wrapper = CacheWrapper::new(memory_store(), WrapperConfig::default());
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = Arc::new(wrapper.wrap(
            "get_products",
            products_of("user-1"),
            move |_: String| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                    Ok::<_, String>("loaded".to_string())
                }
            },
        ));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cached = cached.clone();
                tokio::spawn(async move { cached.call("user-1".to_string()).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "loaded");
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(cached.in_flight.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_without_single_flight_each_miss_fetches() {
        let wrapper = CacheWrapper::new(
            memory_store(),
            WrapperConfig {
                single_flight: false,
            },
        );
        let call_count = Arc::new(AtomicUsize::new(0));
        let count = call_count.clone();

        let cached = Arc::new(wrapper.wrap(
            "get_products",
            products_of("user-1"),
            move |_: String| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                    Ok::<_, String>("loaded".to_string())
                }
            },
        ));

        let (a, b) = tokio::join!(
            cached.call("user-1".to_string()),
            cached.call("user-1".to_string())
        );
        assert_eq!(a.unwrap(), "loaded");
        assert_eq!(b.unwrap(), "loaded");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        // Later calls are hits.
        cached.call("user-1".to_string()).await.unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
