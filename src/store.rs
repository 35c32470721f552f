use async_trait::async_trait;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::tag::CacheTag;

/// A store maps cache keys to tagged entries and keeps a tag → keys index.
///
/// Stores are type-agnostic and work with `StoredEntry` which can hold either
/// typed values (for in-memory stores) or serialized JSON (for persistent stores).
///
/// Implementations must keep `put` and `drop_by_tags` atomic with respect to
/// each other: for every live entry and each of its tags the key is indexed
/// under that tag, and no index entry refers to a removed key.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "redis"
    /// - "tiered"
    fn name(&self) -> &'static str;

    /// Returns the storage mode preference for this store.
    ///
    /// Default implementation returns `Serialized` for safety.
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Serialized
    }

    /// Return the cached entry, or `None` on a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError>;

    /// Record the entry and index its key under each of its tags.
    ///
    /// An existing entry for the key is replaced together with its index links.
    async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError>;

    /// Remove every entry whose tags intersect `tags` and return how many were removed.
    async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError>;

    /// Remove every entry.
    async fn drop_all(&self) -> Result<(), CacheError>;
}
