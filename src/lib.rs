//! tag-cache - A tag-scoped read cache with write-triggered invalidation
//!
//! This library provides:
//! - Memoized reads keyed by query identity and arguments
//! - Tags on every cached read naming the data it depends on
//! - Invalidation of every read carrying a tag touched by a write
//! - Multi-tier storage support (in-memory, moka, Redis)
//! - Coalescing of concurrent misses on the same key
//!
//! # Example
//!
//! ```ignore
//! use tag_cache::{CacheBuilder, HashMapStore, HashMapStoreConfig};
//! use tag_cache::{ResourceKind, RevalidateScope, TagSet, user_tag};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let memory = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
//!     let cache = CacheBuilder::new().tier(memory).build();
//!
//!     // Reads name the tags they depend on.
//!     let tags = TagSet::try_from_tags([user_tag("user_1", ResourceKind::Products)?])?;
//!     let get_products = cache.wrap("get_products", tags, |user_id: String| async move {
//!         db::products_for_user(&user_id).await
//!     });
//!     let products = get_products.call("user_1".to_string()).await?;
//!
//!     // Writes revalidate what they touched.
//!     db::create_product("user_1", "Widget").await?;
//!     cache
//!         .revalidate(ResourceKind::Products, &RevalidateScope::user("user_1"))
//!         .await?;
//!     Ok(())
//! }
//! ```

mod broadcaster;
mod builder;
mod cache;
pub mod catalog;
mod entry;
mod error;
mod key;
mod store;
pub mod stores;
mod tag;
mod tiered;
mod utils;
mod wrapper;

// Re-export public API
pub use broadcaster::{InvalidationBroadcaster, MutationOutcome, RevalidateScope, tags_for};
pub use builder::CacheBuilder;
pub use cache::TagCache;
pub use entry::{Entry, StorageMode, StoredEntry};
pub use error::CacheError;
pub use key::{CacheKey, canonical_json};
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::metrics::{CacheMetric, MetricsSink, MetricsStore};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use tag::{
    CacheTag, ResourceKind, Scope, ScopeKind, TagSet, TrackedScopes, global_tag, id_tag, user_tag,
};
pub use tiered::TieredStore;
pub use wrapper::{CacheWrapper, CachedFn, WrapperConfig};
