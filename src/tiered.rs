use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::Store;
use crate::tag::CacheTag;

/// TieredStore is a store that checks multiple stores in order.
///
/// Stores are checked in the order they are provided.
/// The first store to return a value will be used to populate all previous stores.
///
/// Writes, drops and flushes fan out to every tier. A tier that fails does not
/// stop the others; the first error is returned after all tiers have run.
///
/// Backfills run in the background. Every drop bumps a generation counter
/// while holding it exclusively, and a backfill only writes if the generation
/// it read before the lookup is still current, so a drop that has returned is
/// never undone by a backfill started before it.
pub struct TieredStore {
    tiers: Vec<Arc<dyn Store>>,
    generation: Arc<RwLock<u64>>,
}

impl TieredStore {
    /// Create a new tiered store.
    ///
    /// `stores` can accept `None` as members to allow you to construct the tiers dynamically.
    ///
    /// # Example
    /// ```ignore
    /// TieredStore::new(vec![
    ///     Some(Arc::new(memory_store)),
    ///     if enable_redis { Some(Arc::new(redis_store)) } else { None },
    /// ])
    /// ```
    pub fn new(stores: Vec<Option<Arc<dyn Store>>>) -> Self {
        let tiers = stores.into_iter().flatten().collect();
        TieredStore::from_stores(tiers)
    }

    /// Create a tiered store from a vec of stores (no optional filtering).
    pub fn from_stores(stores: Vec<Arc<dyn Store>>) -> Self {
        TieredStore {
            tiers: stores,
            generation: Arc::new(RwLock::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    fn backfill(&self, upto: usize, seen: u64, key: &CacheKey, entry: &StoredEntry) {
        let lower_tiers: Vec<_> = self.tiers[..upto].to_vec();
        let generation = self.generation.clone();
        let entry = entry.clone();
        let key = key.clone();

        tokio::spawn(async move {
            // Held until every lower tier is written, so drops wait for us.
            let current = generation.read().await;
            if *current != seen {
                tracing::debug!("Skipping backfill of invalidated entry: key={}", key);
                return;
            }

            for tier in lower_tiers {
                let converted = match entry.clone().convert_for_mode(tier.storage_mode()) {
                    Ok(converted) => converted,
                    Err(e) => {
                        tracing::debug!(
                            "Skipping lower tier backfill: tier={}, key={}, error={}",
                            tier.name(),
                            key,
                            e
                        );
                        continue;
                    }
                };

                match tier.put(&key, converted).await {
                    Ok(_) => {
                        tracing::debug!(
                            "Successfully populated lower tier: tier={}, key={}",
                            tier.name(),
                            key
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to populate lower tier: tier={}, key={}, error={}",
                            tier.name(),
                            key,
                            e
                        );
                    }
                }
            }
        });
    }
}

/// Return the first error after every tier has been awaited.
fn first_error<T>(results: Vec<Result<T, CacheError>>) -> Result<Vec<T>, CacheError> {
    results.into_iter().collect()
}

#[async_trait]
impl Store for TieredStore {
    fn name(&self) -> &'static str {
        "tiered"
    }

    fn storage_mode(&self) -> StorageMode {
        self.tiers
            .first()
            .map(|tier| tier.storage_mode())
            .unwrap_or(StorageMode::Serialized)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        // Read before any tier so an in-flight drop finishes first.
        let seen = *self.generation.read().await;
        let mut failures = 0;
        let mut last_error = None;

        for (i, tier) in self.tiers.iter().enumerate() {
            let res = match tier.get(key).await {
                Ok(res) => res,
                Err(e) => {
                    // A broken tier is skipped rather than hiding the tiers behind it.
                    tracing::warn!(
                        "Tier read failed, trying next tier: tier={}, key={}, error={}",
                        tier.name(),
                        key,
                        e
                    );
                    failures += 1;
                    last_error = Some(e);
                    continue;
                }
            };

            if let Some(entry) = res {
                if i > 0 {
                    self.backfill(i, seen, key, &entry);
                }
                return Ok(Some(entry));
            }
        }

        // Only report a failure when no tier could answer at all.
        match last_error {
            Some(e) if failures == self.tiers.len() => Err(e),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError> {
        let futures: Vec<_> = self
            .tiers
            .iter()
            .map(|tier| {
                let entry = entry.clone();
                async move {
                    let converted_entry = entry.convert_for_mode(tier.storage_mode())?;
                    tier.put(key, converted_entry).await
                }
            })
            .collect();

        first_error(join_all(futures).await)?;
        Ok(())
    }

    async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError> {
        let mut generation = self.generation.write().await;
        *generation += 1;

        let futures: Vec<_> = self
            .tiers
            .iter()
            .map(|tier| tier.drop_by_tags(tags))
            .collect();

        // Tiers hold copies of the same entries, so the largest count is the
        // number of distinct entries removed.
        let counts = first_error(join_all(futures).await)?;
        Ok(counts.into_iter().max().unwrap_or(0))
    }

    async fn drop_all(&self) -> Result<(), CacheError> {
        let mut generation = self.generation.write().await;
        *generation += 1;

        let futures: Vec<_> = self.tiers.iter().map(|tier| tier.drop_all()).collect();

        first_error(join_all(futures).await)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use crate::tag::{ResourceKind, id_tag};
    use crate::utils::now_ms;
    use std::collections::BTreeSet;
    use tokio::time::Duration;

    /// A tier whose backend is down.
    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
            Err(CacheError::operation("failing", key.as_str(), "down"))
        }

        async fn put(&self, key: &CacheKey, _entry: StoredEntry) -> Result<(), CacheError> {
            Err(CacheError::operation("failing", key.as_str(), "down"))
        }

        async fn drop_by_tags(&self, _tags: &[CacheTag]) -> Result<usize, CacheError> {
            Err(CacheError::operation("failing", "", "down"))
        }

        async fn drop_all(&self) -> Result<(), CacheError> {
            Err(CacheError::operation("failing", "", "down"))
        }
    }

    /// A healthy tier whose writes take a while to land.
    struct SlowPutStore {
        inner: HashMapStore,
        delay: Duration,
    }

    #[async_trait]
    impl Store for SlowPutStore {
        fn name(&self) -> &'static str {
            "slow_put"
        }

        fn storage_mode(&self) -> StorageMode {
            self.inner.storage_mode()
        }

        async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(key, entry).await
        }

        async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError> {
            self.inner.drop_by_tags(tags).await
        }

        async fn drop_all(&self) -> Result<(), CacheError> {
            self.inner.drop_all().await
        }
    }

    fn key() -> CacheKey {
        CacheKey::derive("get_product", &"p1").unwrap()
    }

    fn tag() -> CacheTag {
        id_tag("p1", ResourceKind::Products).unwrap()
    }

    fn entry(value: &str) -> StoredEntry {
        StoredEntry::from_typed(value.to_string(), BTreeSet::from([tag()]), now_ms())
    }

    #[tokio::test]
    async fn test_tiered_get_from_first_tier() {
        let l1: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let l2: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));

        let tiered = TieredStore::from_stores(vec![l1.clone(), l2.clone()]);

        l1.put(&key(), entry("from_l1")).await.unwrap();

        let result: Entry<String> = tiered.get(&key()).await.unwrap().unwrap().into_typed().unwrap();
        assert_eq!(result.value, "from_l1");
    }

    #[tokio::test]
    async fn test_tiered_backfills_lower_tiers() {
        let l1: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let l2: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));

        let tiered = TieredStore::from_stores(vec![l1.clone(), l2.clone()]);

        l2.put(&key(), entry("from_l2")).await.unwrap();

        let result: Entry<String> = tiered.get(&key()).await.unwrap().unwrap().into_typed().unwrap();
        assert_eq!(result.value, "from_l2");

        // Wait for background backfill
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let backfilled = l1.get(&key()).await.unwrap().unwrap();
        assert_eq!(backfilled.tags(), &BTreeSet::from([tag()]));

        // The backfilled copy is indexed too, so a drop clears both tiers.
        assert_eq!(tiered.drop_by_tags(&[tag()]).await.unwrap(), 1);
        assert!(l1.get(&key()).await.unwrap().is_none());
        assert!(l2.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backfill_does_not_resurrect_dropped_entry() {
        let l1: Arc<dyn Store> = Arc::new(SlowPutStore {
            inner: HashMapStore::new(HashMapStoreConfig::default()),
            delay: Duration::from_millis(20),
        });
        let l2: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let tiered = TieredStore::from_stores(vec![l1.clone(), l2.clone()]);

        l2.put(&key(), entry("old")).await.unwrap();

        // L2 hit starts a backfill into the slow L1.
        assert!(tiered.get(&key()).await.unwrap().is_some());
        assert_eq!(tiered.drop_by_tags(&[tag()]).await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(l1.get(&key()).await.unwrap().is_none());
        assert!(tiered.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backfill_after_drop_still_populates() {
        let l1: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let l2: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let tiered = TieredStore::from_stores(vec![l1.clone(), l2.clone()]);

        tiered.drop_by_tags(&[tag()]).await.unwrap();
        l2.put(&key(), entry("new")).await.unwrap();

        assert!(tiered.get(&key()).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(l1.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tiered_put_writes_all_tiers() {
        let l1: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let l2: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));

        let tiered = TieredStore::new(vec![Some(l1.clone()), None, Some(l2.clone())]);
        assert_eq!(tiered.len(), 2);

        tiered.put(&key(), entry("v")).await.unwrap();

        assert!(l1.get(&key()).await.unwrap().is_some());
        assert!(l2.get(&key()).await.unwrap().is_some());

        tiered.drop_all().await.unwrap();
        assert!(l1.get(&key()).await.unwrap().is_none());
        assert!(l2.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tiered_read_skips_failing_tier() {
        let healthy: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let failing: Arc<dyn Store> = Arc::new(FailingStore);
        let tiered = TieredStore::from_stores(vec![failing, healthy.clone()]);

        healthy.put(&key(), entry("v")).await.unwrap();

        assert!(tiered.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tiered_drop_reports_failure_after_all_tiers() {
        let healthy: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let failing: Arc<dyn Store> = Arc::new(FailingStore);
        let tiered = TieredStore::from_stores(vec![healthy.clone(), failing]);

        healthy.put(&key(), entry("v")).await.unwrap();

        assert!(tiered.drop_by_tags(&[tag()]).await.is_err());
        // The healthy tier was still invalidated.
        assert!(healthy.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_tiered_store() {
        let tiered = TieredStore::new(vec![]);
        assert!(tiered.is_empty());
        assert!(tiered.get(&key()).await.unwrap().is_none());
        assert_eq!(tiered.drop_by_tags(&[tag()]).await.unwrap(), 0);
    }
}
