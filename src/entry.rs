use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::CacheError;
use crate::tag::CacheTag;

/// A cache entry: the value and the tags it was stored under.
///
/// Entries are never updated in place. Invalidation removes them outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<V> {
    /// The cached value.
    pub value: V,

    /// Tags protecting this entry, fixed at creation.
    pub tags: BTreeSet<CacheTag>,

    /// Unix timestamp in milliseconds at which the entry was created.
    pub created_at: i64,
}

type Serializer = Arc<dyn Fn() -> Result<String, CacheError> + Send + Sync>;

/// Type-erased storage entry that supports both typed and serialized storage.
///
/// Stores stay type-agnostic: in-memory stores keep `Typed` values behind an
/// `Arc<dyn Any>` and hand them back without serialization, persistent stores
/// keep the JSON encoding of the whole `Entry<V>`.
#[derive(Clone)]
pub enum StoredEntry {
    /// For in-memory stores: zero-copy storage of typed values.
    ///
    /// The serializer allows conversion to `Serialized` when a tiered cache
    /// writes the entry to a persistent tier.
    Typed {
        value: Arc<dyn Any + Send + Sync>,
        tags: BTreeSet<CacheTag>,
        created_at: i64,
        serializer: Option<Serializer>,
    },
    /// For persistent stores: JSON of `Entry<V>`.
    Serialized {
        data: String,
        tags: BTreeSet<CacheTag>,
        created_at: i64,
    },
}

/// Storage mode preference for stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Store prefers typed values (in-memory stores).
    Typed,
    /// Store prefers serialized values (persistent stores).
    Serialized,
}

impl<V> Entry<V> {
    /// Create a new cache entry.
    pub fn new(value: V, tags: BTreeSet<CacheTag>, created_at: i64) -> Self {
        Entry {
            value,
            tags,
            created_at,
        }
    }
}

impl std::fmt::Debug for StoredEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredEntry::Typed {
                tags, created_at, ..
            } => f
                .debug_struct("Typed")
                .field("tags", tags)
                .field("created_at", created_at)
                .finish_non_exhaustive(),
            StoredEntry::Serialized {
                data,
                tags,
                created_at,
            } => f
                .debug_struct("Serialized")
                .field("data", data)
                .field("tags", tags)
                .field("created_at", created_at)
                .finish(),
        }
    }
}

impl StoredEntry {
    /// Create a StoredEntry from a typed value (for in-memory stores).
    ///
    /// Use `from_typed_with_serializer` when the entry may need to reach a
    /// persistent tier.
    pub fn from_typed<V>(value: V, tags: BTreeSet<CacheTag>, created_at: i64) -> Self
    where
        V: Send + Sync + 'static,
    {
        StoredEntry::Typed {
            value: Arc::new(value),
            tags,
            created_at,
            serializer: None,
        }
    }

    /// Create a StoredEntry from a typed value with serialization support.
    pub fn from_typed_with_serializer<V>(
        value: V,
        tags: BTreeSet<CacheTag>,
        created_at: i64,
    ) -> Self
    where
        V: Clone + Serialize + Send + Sync + 'static,
    {
        let value_arc = Arc::new(value);
        let value_for_serializer = value_arc.clone();
        let tags_for_serializer = tags.clone();

        let serializer: Serializer = Arc::new(move || {
            let entry = Entry::new(
                value_for_serializer.as_ref(),
                tags_for_serializer.clone(),
                created_at,
            );
            serde_json::to_string(&entry)
                .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))
        });

        StoredEntry::Typed {
            value: value_arc,
            tags,
            created_at,
            serializer: Some(serializer),
        }
    }

    /// Serialize a value into a `Serialized` entry (for persistent stores).
    pub fn serialize<V>(value: &V, tags: BTreeSet<CacheTag>, created_at: i64) -> Result<Self, CacheError>
    where
        V: Serialize,
    {
        let data = serde_json::to_string(&Entry::new(value, tags.clone(), created_at))
            .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))?;
        Ok(StoredEntry::Serialized {
            data,
            tags,
            created_at,
        })
    }

    /// Rebuild an entry from the JSON a persistent store holds.
    ///
    /// The tags and creation time are read from the JSON itself, so the
    /// value type is not needed.
    pub fn from_serialized(data: String) -> Result<Self, CacheError> {
        let header: Entry<serde_json::Value> = serde_json::from_str(&data)
            .map_err(|e| CacheError::Serialization(format!("Deserialization failed: {}", e)))?;
        Ok(StoredEntry::Serialized {
            data,
            tags: header.tags,
            created_at: header.created_at,
        })
    }

    /// Convert StoredEntry to a typed Entry<V>.
    ///
    /// - `Typed`: downcasts the Arc value to V and clones it
    /// - `Serialized`: deserializes the JSON string
    pub fn into_typed<V>(self) -> Result<Entry<V>, CacheError>
    where
        V: Clone + for<'de> Deserialize<'de> + Send + Sync + 'static,
    {
        match self {
            StoredEntry::Typed {
                value,
                tags,
                created_at,
                serializer: _,
            } => {
                let typed_arc = value
                    .downcast::<V>()
                    .map_err(|_| CacheError::Serialization("Type downcast failed".to_string()))?;

                Ok(Entry {
                    value: (*typed_arc).clone(),
                    tags,
                    created_at,
                })
            }
            StoredEntry::Serialized { data, .. } => serde_json::from_str(&data)
                .map_err(|e| CacheError::Serialization(format!("Deserialization failed: {}", e))),
        }
    }

    pub fn tags(&self) -> &BTreeSet<CacheTag> {
        match self {
            StoredEntry::Typed { tags, .. } => tags,
            StoredEntry::Serialized { tags, .. } => tags,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            StoredEntry::Typed { created_at, .. } => *created_at,
            StoredEntry::Serialized { created_at, .. } => *created_at,
        }
    }

    /// Whether any of this entry's tags is in `tags`.
    pub fn is_tagged_with_any(&self, tags: &[CacheTag]) -> bool {
        tags.iter().any(|tag| self.tags().contains(tag))
    }

    /// Convert Typed entry to Serialized format using the stored serializer.
    pub fn to_serialized(self) -> Result<Self, CacheError> {
        match self {
            StoredEntry::Serialized { .. } => Ok(self),
            StoredEntry::Typed {
                serializer: Some(ser),
                tags,
                created_at,
                ..
            } => {
                let data = ser()?;
                Ok(StoredEntry::Serialized {
                    data,
                    tags,
                    created_at,
                })
            }
            StoredEntry::Typed {
                serializer: None, ..
            } => Err(CacheError::Serialization(
                "Cannot serialize Typed entry: no serializer available".to_string(),
            )),
        }
    }

    /// Convert StoredEntry to match the target storage mode.
    ///
    /// Serialized entries are left as they are for typed stores; the reader
    /// deserializes on the way out.
    pub fn convert_for_mode(self, target_mode: StorageMode) -> Result<Self, CacheError> {
        match (&self, target_mode) {
            (StoredEntry::Typed { .. }, StorageMode::Serialized) => self.to_serialized(),
            _ => Ok(self),
        }
    }
}
