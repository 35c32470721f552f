//! Shared utilities for the cache library.

use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

/// Build a composite key from a prefix and a key.
///
/// Format: `{prefix}::{key}`
pub fn build_cache_key<N: Display>(prefix: &N, key: &str) -> String {
    format!("{}::{}", prefix, key)
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
