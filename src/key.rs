//! Cache key derivation.
//!
//! A key is `{identity}::{digest}`. The identity is the explicit name a read
//! function is wrapped under; the digest is BLAKE3 over the canonical JSON of
//! its arguments. Arguments go through `serde_json::Value` first, whose objects
//! are ordered maps, so struct fields and map entries always encode in sorted
//! key order regardless of declaration or insertion order.

use serde::Serialize;
use std::fmt;

use crate::error::CacheError;
use crate::utils::build_cache_key;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for calling `identity` with `args`.
    pub fn derive<A>(identity: &str, args: &A) -> Result<CacheKey, CacheError>
    where
        A: Serialize + ?Sized,
    {
        let canonical = canonical_json(args)?;
        let digest = blake3::hash(canonical.as_bytes()).to_hex();
        Ok(CacheKey(build_cache_key(&identity, digest.as_str())))
    }

    /// Wrap an already derived key, e.g. one read back from a persistent store.
    pub fn from_raw(raw: impl Into<String>) -> CacheKey {
        CacheKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity part of the key.
    pub fn identity(&self) -> &str {
        self.0
            .rsplit_once("::")
            .map(|(identity, _)| identity)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact JSON with object keys sorted.
pub fn canonical_json<A>(args: &A) -> Result<String, CacheError>
where
    A: Serialize + ?Sized,
{
    let value = serde_json::to_value(args)
        .map_err(|e| CacheError::Serialization(format!("Argument encoding failed: {}", e)))?;
    serde_json::to_string(&value)
        .map_err(|e| CacheError::Serialization(format!("Argument encoding failed: {}", e)))
}
