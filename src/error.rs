use crate::tag::{ResourceKind, ScopeKind};

/// Error type for cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A store operation failed. Reads treat this as a miss; invalidations surface it.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A user or entity scope was built from an empty identifier.
    #[error("empty {scope} identifier for '{kind}' tag")]
    InvalidScope { kind: ResourceKind, scope: ScopeKind },
    /// A read was tagged with a scope its resource kind does not track.
    #[error("'{kind}' does not track {scope} scoped tags")]
    ScopeNotTracked { kind: ResourceKind, scope: ScopeKind },
    /// Tag text could not be parsed back into a tag.
    #[error("invalid cache tag '{0}'")]
    InvalidTag(String),
}

impl CacheError {
    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}
