use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::Store;
use crate::tag::CacheTag;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold. Entries evicted under
    /// capacity pressure read as misses and are unlinked from the tag index.
    pub max_capacity: u64,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
        }
    }
}

type TagIndex = HashMap<CacheTag, HashSet<CacheKey>>;
type PendingEvictions = Arc<StdMutex<Vec<(CacheKey, BTreeSet<CacheTag>)>>>;

/// High-performance concurrent store using Moka.
///
/// Reads go straight to Moka without locking. Puts and drops serialize on
/// the tag index lock, which also folds in entries Moka evicted on its own.
pub struct MokaStore {
    cache: Cache<CacheKey, StoredEntry>,
    index: Mutex<TagIndex>,
    evicted: PendingEvictions,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let store = MokaStore::new(MokaStoreConfig { max_capacity: 10_000 });
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let evicted: PendingEvictions = Arc::default();
        let listener_queue = evicted.clone();

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .eviction_listener(
                move |key: Arc<CacheKey>, entry: StoredEntry, cause: RemovalCause| {
                    // Explicit removals and replacements are unlinked by the caller.
                    if cause.was_evicted() {
                        listener_queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(((*key).clone(), entry.tags().clone()));
                    }
                },
            )
            .build();

        MokaStore {
            cache,
            index: Mutex::new(HashMap::new()),
            evicted,
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        let entry_count = self.cache.entry_count();
        let weighted_size = self.cache.weighted_size();
        (entry_count, weighted_size)
    }

    /// Keys currently indexed under `tag`.
    pub async fn keys_for_tag(&self, tag: &CacheTag) -> HashSet<CacheKey> {
        let mut index = self.index.lock().await;
        self.reconcile_evictions(&mut index).await;
        index.get(tag).cloned().unwrap_or_default()
    }

    /// Run Moka's pending maintenance, delivering any evictions.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Unlink entries Moka evicted since the last index operation.
    async fn reconcile_evictions(&self, index: &mut TagIndex) {
        let pending = std::mem::take(
            &mut *self
                .evicted
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (key, tags) in pending {
            // The key may have been put again after the eviction. Keep the
            // links its current entry still needs.
            let current = self.cache.get(&key).await;
            for tag in tags {
                if current
                    .as_ref()
                    .is_some_and(|entry| entry.tags().contains(&tag))
                {
                    continue;
                }
                unlink(index, &tag, &key);
            }
        }
    }
}

fn unlink(index: &mut TagIndex, tag: &CacheTag, key: &CacheKey) {
    if let Some(keys) = index.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(tag);
        }
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    fn storage_mode(&self) -> StorageMode {
        StorageMode::Typed
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        self.reconcile_evictions(&mut index).await;

        if let Some(previous) = self.cache.get(key).await {
            for tag in previous.tags().difference(entry.tags()) {
                unlink(&mut index, tag, key);
            }
        }

        for tag in entry.tags() {
            index.entry(tag.clone()).or_default().insert(key.clone());
        }
        self.cache.insert(key.clone(), entry).await;

        Ok(())
    }

    async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError> {
        let mut index = self.index.lock().await;
        self.reconcile_evictions(&mut index).await;

        let keys: HashSet<CacheKey> = tags
            .iter()
            .filter_map(|tag| index.get(tag))
            .flatten()
            .cloned()
            .collect();

        let mut removed = 0;
        for key in keys {
            // `None` means Moka evicted it first; its pending eviction unlinks it.
            if let Some(entry) = self.cache.remove(&key).await {
                for tag in entry.tags() {
                    unlink(&mut index, tag, &key);
                }
                removed += 1;
            }
        }

        for tag in tags {
            index.remove(tag);
        }

        Ok(removed)
    }

    async fn drop_all(&self) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        self.cache.invalidate_all();
        index.clear();
        self.evicted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
