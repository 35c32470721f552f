//! The data-access seam and the records it returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A failed query or statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("database error: {0}")]
pub struct RepositoryError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

/// Fields left as `None` are not changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryGroup {
    pub id: String,
    pub name: String,
    pub recommended_discount_percentage: Option<f64>,
    pub countries: Vec<Country>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryDiscount {
    pub coupon: String,
    /// Fraction of the price, `0.0..=1.0`.
    pub discount_percentage: f64,
}

/// A country group together with the discount one product offers in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCountryGroup {
    pub id: String,
    pub name: String,
    pub recommended_discount_percentage: Option<f64>,
    pub countries: Vec<Country>,
    pub discount: Option<CountryDiscount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryGroupDiscount {
    pub country_group_id: String,
    pub coupon: String,
    pub discount_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCustomization {
    pub product_id: String,
    pub location_message: String,
    pub background_color: String,
    pub text_color: String,
    pub font_size: String,
    pub banner_container: String,
    pub is_sticky: bool,
}

impl ProductCustomization {
    pub fn new(product_id: impl Into<String>) -> Self {
        ProductCustomization {
            product_id: product_id.into(),
            location_message: "Hey! It looks like you are from <b>{country}</b>. We support Parity Purchasing Power, so if you need it, use code <b>\u{201c}{coupon}\u{201d}</b> to get <b>{discount}%</b> off.".to_string(),
            background_color: "hsl(193, 82%, 31%)".to_string(),
            text_color: "hsl(0, 0%, 100%)".to_string(),
            font_size: "1rem".to_string(),
            banner_container: "body".to_string(),
            is_sticky: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionTier {
    Free,
    Basic,
    Standard,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: String,
    pub user_id: String,
    pub tier: SubscriptionTier,
}

/// Ids of the rows removed when a user is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedUser {
    pub subscription_ids: Vec<String>,
    pub product_ids: Vec<String>,
}

/// Data access for the catalog.
///
/// Mutations report what they changed, as affected-row counts or the rows
/// they returned, so callers can skip invalidation when nothing changed.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Products owned by `user_id`, newest first.
    async fn products_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// The product `id` if it is owned by `user_id`.
    async fn product(&self, id: &str, user_id: &str) -> Result<Option<Product>, RepositoryError>;

    async fn product_count(&self, user_id: &str) -> Result<u64, RepositoryError>;

    /// Every country group, with the discount `product_id` offers in each.
    async fn country_groups_for_product(
        &self,
        product_id: &str,
    ) -> Result<Vec<ProductCountryGroup>, RepositoryError>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    /// Insert default customization for a product. Does nothing if one exists.
    async fn insert_default_customization(&self, product_id: &str) -> Result<(), RepositoryError>;

    async fn update_product(
        &self,
        id: &str,
        user_id: &str,
        update: ProductUpdate,
    ) -> Result<u64, RepositoryError>;

    async fn delete_product(&self, id: &str, user_id: &str) -> Result<u64, RepositoryError>;

    /// Remove the discounts for `delete_group_ids` and upsert `upserts`, for
    /// a product owned by `user_id`. Returns the number of rows changed.
    async fn update_country_discounts(
        &self,
        product_id: &str,
        user_id: &str,
        delete_group_ids: Vec<String>,
        upserts: Vec<CountryGroupDiscount>,
    ) -> Result<u64, RepositoryError>;

    async fn product_customization(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>, RepositoryError>;

    async fn update_product_customization(
        &self,
        customization: ProductCustomization,
        user_id: &str,
    ) -> Result<u64, RepositoryError>;

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSubscription>, RepositoryError>;

    /// Insert a subscription unless the user already has one.
    /// Returns the new row, or `None` on conflict.
    async fn insert_subscription(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
    ) -> Result<Option<UserSubscription>, RepositoryError>;

    /// Delete the user's subscriptions and products in one batch.
    async fn delete_user_data(&self, user_id: &str) -> Result<DeletedUser, RepositoryError>;
}
