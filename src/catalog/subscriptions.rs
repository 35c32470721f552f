use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CatalogError, after_commit};
use super::repository::{Repository, SubscriptionTier, UserSubscription};
use crate::broadcaster::RevalidateScope;
use crate::cache::TagCache;
use crate::tag::{ResourceKind, TagSet, user_tag};

/// What a subscription tier allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapabilities {
    pub name: String,
    pub max_number_of_products: u64,
    pub max_number_of_visits: u64,
    pub can_access_analytics: bool,
    pub can_customize_banner: bool,
    pub can_remove_branding: bool,
}

/// Maps a tier to its capabilities. The rules themselves live elsewhere.
pub trait TierPolicy: Send + Sync {
    fn capabilities(&self, tier: SubscriptionTier) -> TierCapabilities;
}

impl<F> TierPolicy for F
where
    F: Fn(SubscriptionTier) -> TierCapabilities + Send + Sync,
{
    fn capabilities(&self, tier: SubscriptionTier) -> TierCapabilities {
        self(tier)
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    cache: TagCache,
    repository: Arc<dyn Repository>,
    tiers: Arc<dyn TierPolicy>,
}

impl SubscriptionService {
    pub fn new(cache: TagCache, repository: Arc<dyn Repository>, tiers: Arc<dyn TierPolicy>) -> Self {
        SubscriptionService {
            cache,
            repository,
            tiers,
        }
    }

    pub async fn get_user_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSubscription>, CatalogError> {
        let tags = TagSet::try_from_tags([user_tag(user_id, ResourceKind::Subscription)?])?;
        let repository = self.repository.clone();

        let subscription = self
            .cache
            .wrap("catalog::get_user_subscription", tags, move |user_id: String| {
                let repository = repository.clone();
                async move { repository.subscription_for_user(&user_id).await }
            })
            .call(user_id.to_string())
            .await?;

        Ok(subscription)
    }

    /// Capabilities of the user's tier. Every user is expected to have a
    /// subscription, so a missing one is an error.
    pub async fn get_user_subscription_tier(
        &self,
        user_id: &str,
    ) -> Result<TierCapabilities, CatalogError> {
        let subscription = self
            .get_user_subscription(user_id)
            .await?
            .ok_or_else(|| CatalogError::NoSubscription(user_id.to_string()))?;

        Ok(self.tiers.capabilities(subscription.tier))
    }

    /// Subscribe the user to `tier` unless they already have a subscription.
    /// Returns the new subscription, or `None` if one existed.
    pub async fn create_user_subscription(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
    ) -> Result<Option<UserSubscription>, CatalogError> {
        user_tag(user_id, ResourceKind::Subscription)?;
        let subscription = self.repository.insert_subscription(user_id, tier).await?;

        if let Some(created) = &subscription {
            let result = self
                .cache
                .revalidate(
                    ResourceKind::Subscription,
                    &RevalidateScope::user_entity(&created.user_id, &created.id),
                )
                .await;
            after_commit(ResourceKind::Subscription, result);
        }

        Ok(subscription)
    }
}
