use std::sync::Arc;

use super::{CatalogError, after_commit};
use super::repository::{
    CountryGroupDiscount, NewProduct, Product, ProductCountryGroup, ProductCustomization,
    ProductUpdate, Repository,
};
use crate::broadcaster::{RevalidateScope, tags_for};
use crate::cache::TagCache;
use crate::tag::{ResourceKind, TagSet, global_tag, id_tag, user_tag};

/// One row of a country discount form.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryDiscountInput {
    pub country_group_id: String,
    /// Whole percent, `1..=100`.
    pub discount_percentage: Option<f64>,
    pub coupon: Option<String>,
}

/// Products, their country groups and their banner customization.
#[derive(Clone)]
pub struct ProductService {
    cache: TagCache,
    repository: Arc<dyn Repository>,
}

impl ProductService {
    pub fn new(cache: TagCache, repository: Arc<dyn Repository>) -> Self {
        ProductService { cache, repository }
    }

    /// The user's products, newest first.
    pub async fn get_products(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, CatalogError> {
        let tags = TagSet::try_from_tags([user_tag(user_id, ResourceKind::Products)?])?;
        let repository = self.repository.clone();

        let products = self
            .cache
            .wrap(
                "catalog::get_products",
                tags,
                move |(user_id, limit): (String, Option<usize>)| {
                    let repository = repository.clone();
                    async move { repository.products_for_user(&user_id, limit).await }
                },
            )
            .call((user_id.to_string(), limit))
            .await?;

        Ok(products)
    }

    pub async fn get_product(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Product>, CatalogError> {
        let tags = TagSet::try_from_tags([id_tag(id, ResourceKind::Products)?])?;
        let repository = self.repository.clone();

        let product = self
            .cache
            .wrap(
                "catalog::get_product",
                tags,
                move |(id, user_id): (String, String)| {
                    let repository = repository.clone();
                    async move { repository.product(&id, &user_id).await }
                },
            )
            .call((id.to_string(), user_id.to_string()))
            .await?;

        Ok(product)
    }

    /// Every country group with the product's discount in it. Empty if the
    /// user does not own the product.
    pub async fn get_product_country_groups(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProductCountryGroup>, CatalogError> {
        let tags = TagSet::try_from_tags([
            id_tag(product_id, ResourceKind::Products)?,
            global_tag(ResourceKind::Countries),
            global_tag(ResourceKind::CountryGroups),
        ])?;
        let service = self.clone();

        self.cache
            .wrap(
                "catalog::get_product_country_groups",
                tags,
                move |(product_id, user_id): (String, String)| {
                    let service = service.clone();
                    async move {
                        let groups = match service.get_product(&product_id, &user_id).await? {
                            Some(_) => {
                                service
                                    .repository
                                    .country_groups_for_product(&product_id)
                                    .await?
                            }
                            None => Vec::new(),
                        };
                        Ok::<_, CatalogError>(groups)
                    }
                },
            )
            .call((product_id.to_string(), user_id.to_string()))
            .await
    }

    pub async fn get_product_count(&self, user_id: &str) -> Result<u64, CatalogError> {
        let tags = TagSet::try_from_tags([user_tag(user_id, ResourceKind::Products)?])?;
        let repository = self.repository.clone();

        let count = self
            .cache
            .wrap("catalog::get_product_count", tags, move |user_id: String| {
                let repository = repository.clone();
                async move { repository.product_count(&user_id).await }
            })
            .call(user_id.to_string())
            .await?;

        Ok(count)
    }

    /// Dropped together with the product, or when the customization changes.
    pub async fn get_product_customization(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>, CatalogError> {
        let tags = TagSet::try_from_tags([
            id_tag(product_id, ResourceKind::Products)?,
            id_tag(product_id, ResourceKind::Customization)?,
        ])?;
        let repository = self.repository.clone();

        let customization = self
            .cache
            .wrap(
                "catalog::get_product_customization",
                tags,
                move |(product_id, user_id): (String, String)| {
                    let repository = repository.clone();
                    async move { repository.product_customization(&product_id, &user_id).await }
                },
            )
            .call((product_id.to_string(), user_id.to_string()))
            .await?;

        Ok(customization)
    }

    /// Insert a product with default customization.
    ///
    /// If the customization cannot be created the product is removed again
    /// and the error returned.
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        user_tag(&product.user_id, ResourceKind::Products)?;
        let product = self.repository.insert_product(product).await?;

        let customization = self
            .repository
            .insert_default_customization(&product.id)
            .await;

        if let Err(e) = &customization {
            tracing::warn!(
                "Failed to create product customization, removing product: product={}, error={}",
                product.id,
                e
            );
            self.repository
                .delete_product(&product.id, &product.user_id)
                .await?;
        }

        // Readers may have seen the product even if it was rolled back.
        let result = self
            .cache
            .revalidate(
                ResourceKind::Products,
                &RevalidateScope::user_entity(&product.user_id, &product.id),
            )
            .await;
        after_commit(ResourceKind::Products, result);

        customization?;
        tracing::debug!("Product created: product={}, user={}", product.id, product.user_id);
        Ok(product)
    }

    /// Returns whether the user owned the product and it was updated.
    pub async fn update_product(
        &self,
        id: &str,
        user_id: &str,
        update: ProductUpdate,
    ) -> Result<bool, CatalogError> {
        let scope = RevalidateScope::user_entity(user_id, id);
        tags_for(ResourceKind::Products, &scope)?;
        let rows = self.repository.update_product(id, user_id, update).await?;

        let result = self
            .cache
            .revalidate_after(&rows, ResourceKind::Products, &scope)
            .await;
        after_commit(ResourceKind::Products, result);

        Ok(rows > 0)
    }

    /// Returns whether the user owned the product and it was deleted.
    pub async fn delete_product(&self, id: &str, user_id: &str) -> Result<bool, CatalogError> {
        let scope = RevalidateScope::user_entity(user_id, id);
        tags_for(ResourceKind::Products, &scope)?;
        let rows = self.repository.delete_product(id, user_id).await?;

        let result = self
            .cache
            .revalidate_after(&rows, ResourceKind::Products, &scope)
            .await;
        after_commit(ResourceKind::Products, result);

        Ok(rows > 0)
    }

    /// Save a country discount form. Rows with a coupon and a positive
    /// discount are upserted, the rest are removed.
    pub async fn update_country_discounts(
        &self,
        product_id: &str,
        user_id: &str,
        groups: Vec<CountryDiscountInput>,
    ) -> Result<bool, CatalogError> {
        let scope = RevalidateScope::user_entity(user_id, product_id);
        tags_for(ResourceKind::Products, &scope)?;

        let mut upserts = Vec::new();
        let mut delete_group_ids = Vec::new();

        for group in groups {
            match (group.coupon, group.discount_percentage) {
                (Some(coupon), Some(percentage)) if !coupon.is_empty() && percentage > 0.0 => {
                    upserts.push(CountryGroupDiscount {
                        country_group_id: group.country_group_id,
                        coupon,
                        discount_percentage: percentage / 100.0,
                    });
                }
                _ => delete_group_ids.push(group.country_group_id),
            }
        }

        let rows = self
            .repository
            .update_country_discounts(product_id, user_id, delete_group_ids, upserts)
            .await?;

        let result = self
            .cache
            .revalidate_after(&rows, ResourceKind::Products, &scope)
            .await;
        after_commit(ResourceKind::Products, result);

        Ok(rows > 0)
    }

    pub async fn update_product_customization(
        &self,
        customization: ProductCustomization,
        user_id: &str,
    ) -> Result<bool, CatalogError> {
        let product_id = customization.product_id.clone();
        let scope = RevalidateScope::user_entity(user_id, &product_id);
        tags_for(ResourceKind::Customization, &scope)?;
        let rows = self
            .repository
            .update_product_customization(customization, user_id)
            .await?;

        let result = self
            .cache
            .revalidate_after(&rows, ResourceKind::Customization, &scope)
            .await;
        after_commit(ResourceKind::Customization, result);

        Ok(rows > 0)
    }
}
