use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::Store;
use crate::tag::CacheTag;

/// Configuration for eviction on put operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each put.
    ///
    /// - `1.0` -> run eviction on every `put`
    /// - `0.5` -> run eviction on every 2nd `put` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove the oldest entries until at most `max_items` remain.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default)]
pub struct HashMapStoreConfig {
    /// Bound the number of entries, checked on `put`. `None` keeps every
    /// entry until it is invalidated.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Entries and the tag index, always mutated together under one lock.
#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, StoredEntry>,
    index: HashMap<CacheTag, HashSet<CacheKey>>,
}

impl State {
    fn insert(&mut self, key: &CacheKey, entry: StoredEntry) {
        self.remove(key);
        for tag in entry.tags() {
            self.index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(key.clone(), entry);
    }

    fn remove(&mut self, key: &CacheKey) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        for tag in entry.tags() {
            if let Some(keys) = self.index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn evict_oldest(&mut self, max_items: usize) {
        if self.entries.len() <= max_items {
            return;
        }

        let mut by_age: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.created_at()))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);

        let to_remove = self.entries.len() - max_items;
        for (key, _) in by_age.into_iter().take(to_remove) {
            self.remove(&key);
        }
    }
}

/// Thread-safe in-memory store using HashMap with RwLock.
///
/// Suitable for:
/// - Low to moderate concurrency (<8 threads)
/// - Small to medium cache sizes (<1000 items)
/// - Tests, where `drop_all` resets it between cases
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<State>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl HashMapStore {
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(State::default()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys currently indexed under `tag`.
    pub async fn keys_for_tag(&self, tag: &CacheTag) -> HashSet<CacheKey> {
        self.state
            .read()
            .await
            .index
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    fn should_evict(&self) -> Option<usize> {
        let config = self.evict_on_set.as_ref()?;

        if config.frequency <= 0.0 {
            return None;
        }

        if config.frequency >= 1.0 || rand::random::<f64>() < config.frequency {
            Some(config.max_items)
        } else {
            None
        }
    }
}

#[async_trait]
impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn storage_mode(&self) -> StorageMode {
        StorageMode::Typed
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        let state = self.state.read().await;
        Ok(state.entries.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.insert(key, entry);

        if let Some(max_items) = self.should_evict() {
            state.evict_oldest(max_items);
        }

        Ok(())
    }

    async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError> {
        let mut state = self.state.write().await;

        let keys: HashSet<CacheKey> = tags
            .iter()
            .filter_map(|tag| state.index.get(tag))
            .flatten()
            .cloned()
            .collect();

        let removed = keys
            .iter()
            .filter(|key| state.remove(key).is_some())
            .count();

        Ok(removed)
    }

    async fn drop_all(&self) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.index.clear();
        Ok(())
    }
}
