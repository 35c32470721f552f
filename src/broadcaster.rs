//! Write-side invalidation.
//!
//! After a mutation succeeds, the caller names the resource kind it touched and
//! the scope of the change. The broadcaster turns that into the affected tag
//! set and drops every cached read carrying any of those tags.

use std::sync::Arc;

use crate::error::CacheError;
use crate::store::Store;
use crate::tag::{CacheTag, ResourceKind, global_tag, id_tag, user_tag};

/// The scope of a mutation: the owning user and/or the entity changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidateScope<'a> {
    pub user_id: Option<&'a str>,
    pub id: Option<&'a str>,
}

impl<'a> RevalidateScope<'a> {
    /// Only the global tag of the kind.
    pub fn global() -> Self {
        RevalidateScope::default()
    }

    pub fn user(user_id: &'a str) -> Self {
        RevalidateScope {
            user_id: Some(user_id),
            id: None,
        }
    }

    pub fn entity(id: &'a str) -> Self {
        RevalidateScope {
            user_id: None,
            id: Some(id),
        }
    }

    pub fn user_entity(user_id: &'a str, id: &'a str) -> Self {
        RevalidateScope {
            user_id: Some(user_id),
            id: Some(id),
        }
    }
}

/// Compute the tags a mutation of `kind` within `scope` invalidates.
///
/// The global tag is always included. User and entity tags are included when
/// the scope names them and the kind tracks that scope. Identifiers are
/// validated even when the kind does not track their scope.
pub fn tags_for(kind: ResourceKind, scope: &RevalidateScope<'_>) -> Result<Vec<CacheTag>, CacheError> {
    let tracked = kind.tracked_scopes();
    let mut tags = vec![global_tag(kind)];

    if let Some(user_id) = scope.user_id {
        let tag = user_tag(user_id, kind)?;
        if tracked.user {
            tags.push(tag);
        }
    }

    if let Some(id) = scope.id {
        let tag = id_tag(id, kind)?;
        if tracked.id {
            tags.push(tag);
        }
    }

    Ok(tags)
}

/// The result of a mutation, reporting whether anything was changed.
pub trait MutationOutcome {
    fn affected(&self) -> bool;
}

impl MutationOutcome for bool {
    fn affected(&self) -> bool {
        *self
    }
}

impl MutationOutcome for u64 {
    fn affected(&self) -> bool {
        *self > 0
    }
}

impl MutationOutcome for usize {
    fn affected(&self) -> bool {
        *self > 0
    }
}

impl<T> MutationOutcome for Option<T> {
    fn affected(&self) -> bool {
        self.is_some()
    }
}

impl<T> MutationOutcome for Vec<T> {
    fn affected(&self) -> bool {
        !self.is_empty()
    }
}

/// Drops cached reads affected by writes.
#[derive(Clone)]
pub struct InvalidationBroadcaster {
    store: Arc<dyn Store>,
}

impl InvalidationBroadcaster {
    pub fn new(store: Arc<dyn Store>) -> Self {
        InvalidationBroadcaster { store }
    }

    /// Invalidate every read affected by a mutation of `kind` within `scope`.
    ///
    /// Returns the number of entries removed. Invalid identifiers are rejected
    /// before the store is touched. Store failures are returned to the caller.
    pub async fn revalidate(
        &self,
        kind: ResourceKind,
        scope: &RevalidateScope<'_>,
    ) -> Result<usize, CacheError> {
        let tags = tags_for(kind, scope)?;

        match self.store.drop_by_tags(&tags).await {
            Ok(removed) => {
                tracing::debug!(
                    "Revalidated: kind={}, tags={}, removed={}",
                    kind,
                    tags.len(),
                    removed
                );
                Ok(removed)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to revalidate, cached reads may be stale: kind={}, tier={}, error={}",
                    kind,
                    self.store.name(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Revalidate only if `outcome` reports that the mutation changed something.
    pub async fn revalidate_after<O>(
        &self,
        outcome: &O,
        kind: ResourceKind,
        scope: &RevalidateScope<'_>,
    ) -> Result<usize, CacheError>
    where
        O: MutationOutcome + ?Sized,
    {
        if !outcome.affected() {
            tracing::debug!("Mutation changed nothing, skipping revalidate: kind={}", kind);
            return Ok(0);
        }
        self.revalidate(kind, scope).await
    }

    /// Drop every cached read.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        match self.store.drop_all().await {
            Ok(()) => {
                tracing::info!("Cleared all cached reads: tier={}", self.store.name());
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to clear cache: tier={}, error={}",
                    self.store.name(),
                    e
                );
                Err(e)
            }
        }
    }
}
