//! Metrics middleware for cache stores.
//!
//! This module provides a `MetricsStore` wrapper that emits metrics for all
//! store operations (reads, writes, invalidations, flushes) to a user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tag_cache::{MokaStore, MokaStoreConfig, Store};
//! use tag_cache::{CacheMetric, MetricsSink, MetricsStore};
//!
//! let sink = Arc::new(MyMetricsSink::new());
//!
//! let moka = Arc::new(MokaStore::new(MokaStoreConfig::default()));
//! let store: Arc<dyn Store> = Arc::new(MetricsStore::new(moka, sink.clone()));
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::Store;
use crate::tag::CacheTag;

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every read (get) operation.
    Read {
        /// The cache key that was read.
        key: String,
        /// Whether the key was found in the cache.
        hit: bool,
        /// Whether the store failed; a failed read is served as a miss.
        failed: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
    /// Emitted on every write (put) operation.
    Write {
        /// The cache key that was written.
        key: String,
        /// Number of tags the entry was stored under.
        tag_count: usize,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
    /// Emitted on every drop-by-tags operation.
    Invalidate {
        /// Tags in the batch, in their text form.
        tags: Vec<String>,
        /// Entries removed, or `None` when the store failed.
        removed: Option<usize>,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
    /// Emitted on every full flush.
    Flush {
        /// Whether the flush succeeded.
        ok: bool,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the store tier (from Store::name()).
        tier: String,
    },
}

/// Trait for receiving cache metrics.
///
/// # Example
///
/// ```ignore
/// use std::sync::Mutex;
/// use async_trait::async_trait;
/// use tag_cache::{CacheMetric, MetricsSink};
///
/// struct BufferedSink {
///     buffer: Mutex<Vec<CacheMetric>>,
/// }
///
/// #[async_trait]
/// impl MetricsSink for BufferedSink {
///     fn emit(&self, metric: CacheMetric) {
///         self.buffer.lock().unwrap().push(metric);
///     }
///
///     async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    ///
    /// This is called synchronously in the hot path of cache operations.
    /// Implementations should be fast (e.g., buffer metrics in memory).
    fn emit(&self, metric: CacheMetric);

    /// Flush any buffered metrics.
    ///
    /// This is typically called at shutdown or at periodic intervals.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A store wrapper that emits metrics for all operations.
pub struct MetricsStore {
    inner: Arc<dyn Store>,
    sink: Arc<dyn MetricsSink>,
    tier_name: String,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given store.
    pub fn new(inner: Arc<dyn Store>, sink: Arc<dyn MetricsSink>) -> Self {
        let tier_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            tier_name,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Store for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            hit: matches!(result, Ok(Some(_))),
            failed: result.is_err(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn put(&self, key: &CacheKey, entry: StoredEntry) -> Result<(), CacheError> {
        let tag_count = entry.tags().len();
        let start = Instant::now();
        let result = self.inner.put(key, entry).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            tag_count,
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn drop_by_tags(&self, tags: &[CacheTag]) -> Result<usize, CacheError> {
        let start = Instant::now();
        let result = self.inner.drop_by_tags(tags).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Invalidate {
            tags: tags.iter().map(ToString::to_string).collect(),
            removed: result.as_ref().ok().copied(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn drop_all(&self) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.drop_all().await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Flush {
            ok: result.is_ok(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }
}
