use std::sync::Arc;

use super::{CatalogError, after_commit};
use super::repository::{DeletedUser, Repository};
use crate::broadcaster::RevalidateScope;
use crate::cache::TagCache;
use crate::tag::{ResourceKind, user_tag};

#[derive(Clone)]
pub struct UserService {
    cache: TagCache,
    repository: Arc<dyn Repository>,
}

impl UserService {
    pub fn new(cache: TagCache, repository: Arc<dyn Repository>) -> Self {
        UserService { cache, repository }
    }

    /// Delete a user's subscriptions and products.
    ///
    /// Every deleted row is revalidated. Failed revalidations are logged and
    /// do not fail the deletion.
    pub async fn delete_user(&self, user_id: &str) -> Result<DeletedUser, CatalogError> {
        user_tag(user_id, ResourceKind::Products)?;
        let deleted = self.repository.delete_user_data(user_id).await?;

        let rows = deleted
            .subscription_ids
            .iter()
            .map(|id| (ResourceKind::Subscription, id))
            .chain(
                deleted
                    .product_ids
                    .iter()
                    .map(|id| (ResourceKind::Products, id)),
            );

        for (kind, id) in rows {
            let result = self
                .cache
                .revalidate(kind, &RevalidateScope::user_entity(user_id, id))
                .await;
            after_commit(kind, result);
        }

        tracing::info!(
            "User deleted: user={}, subscriptions={}, products={}",
            user_id,
            deleted.subscription_ids.len(),
            deleted.product_ids.len()
        );

        Ok(deleted)
    }
}
