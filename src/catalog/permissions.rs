//! Tier-based permission checks.
//!
//! A missing or empty user id is never permitted. These checks read through
//! the cache, so they see a tier change as soon as it is revalidated.

use super::CatalogError;
use super::products::ProductService;
use super::subscriptions::{SubscriptionService, TierCapabilities};

#[derive(Clone)]
pub struct Permissions {
    products: ProductService,
    subscriptions: SubscriptionService,
}

fn signed_in(user_id: Option<&str>) -> Option<&str> {
    user_id.filter(|id| !id.is_empty())
}

impl Permissions {
    pub fn new(products: ProductService, subscriptions: SubscriptionService) -> Self {
        Permissions {
            products,
            subscriptions,
        }
    }

    async fn tier_allows(
        &self,
        user_id: Option<&str>,
        allowed: impl FnOnce(&TierCapabilities) -> bool,
    ) -> Result<bool, CatalogError> {
        let Some(user_id) = signed_in(user_id) else {
            return Ok(false);
        };
        let tier = self.subscriptions.get_user_subscription_tier(user_id).await?;
        Ok(allowed(&tier))
    }

    /// Whether the user is below their tier's product limit.
    pub async fn can_create_product(&self, user_id: Option<&str>) -> Result<bool, CatalogError> {
        let Some(user_id) = signed_in(user_id) else {
            return Ok(false);
        };
        let tier = self.subscriptions.get_user_subscription_tier(user_id).await?;
        let count = self.products.get_product_count(user_id).await?;
        Ok(count < tier.max_number_of_products)
    }

    pub async fn can_customize_banner(&self, user_id: Option<&str>) -> Result<bool, CatalogError> {
        self.tier_allows(user_id, |tier| tier.can_customize_banner).await
    }

    pub async fn can_remove_branding(&self, user_id: Option<&str>) -> Result<bool, CatalogError> {
        self.tier_allows(user_id, |tier| tier.can_remove_branding).await
    }

    pub async fn can_access_analytics(&self, user_id: Option<&str>) -> Result<bool, CatalogError> {
        self.tier_allows(user_id, |tier| tier.can_access_analytics).await
    }
}
