use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::repository::{
    CountryDiscount, CountryGroup, CountryGroupDiscount, DeletedUser, NewProduct, Product,
    ProductCountryGroup, ProductCustomization, ProductUpdate, Repository, RepositoryError,
    SubscriptionTier, UserSubscription,
};

#[derive(Default)]
struct Tables {
    sequence: u64,
    products: Vec<Product>,
    customizations: HashMap<String, ProductCustomization>,
    country_groups: Vec<CountryGroup>,
    // (product_id, discount)
    discounts: Vec<(String, CountryGroupDiscount)>,
    subscriptions: Vec<UserSubscription>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> (String, i64) {
        self.sequence += 1;
        (format!("{}_{}", prefix, self.sequence), self.sequence as i64)
    }

    fn owns(&self, product_id: &str, user_id: &str) -> bool {
        self.products
            .iter()
            .any(|p| p.id == product_id && p.user_id == user_id)
    }
}

/// A [`Repository`] held in process memory.
///
/// Counts the queries it serves, so callers can observe which reads reached
/// the database, and can be told to fail reads or customization inserts.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_customization_inserts: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        InMemoryRepository::default()
    }

    /// Number of read queries served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make every read fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make inserting default customization fail until reset.
    pub fn set_fail_customization_inserts(&self, fail: bool) {
        self.fail_customization_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn add_country_group(&self, group: CountryGroup) {
        self.tables.write().await.country_groups.push(group);
    }

    pub async fn has_customization(&self, product_id: &str) -> bool {
        self.tables.read().await.customizations.contains_key(product_id)
    }

    fn record_read(&self) -> Result<(), RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn products_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;

        let mut products: Vec<Product> = tables
            .products
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn product(&self, id: &str, user_id: &str) -> Result<Option<Product>, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;

        Ok(tables
            .products
            .iter()
            .find(|p| p.id == id && p.user_id == user_id)
            .cloned())
    }

    async fn product_count(&self, user_id: &str) -> Result<u64, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;

        Ok(tables.products.iter().filter(|p| p.user_id == user_id).count() as u64)
    }

    async fn country_groups_for_product(
        &self,
        product_id: &str,
    ) -> Result<Vec<ProductCountryGroup>, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;

        Ok(tables
            .country_groups
            .iter()
            .map(|group| {
                let discount = tables
                    .discounts
                    .iter()
                    .find(|(pid, d)| pid == product_id && d.country_group_id == group.id)
                    .map(|(_, d)| CountryDiscount {
                        coupon: d.coupon.clone(),
                        discount_percentage: d.discount_percentage,
                    });

                ProductCountryGroup {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    recommended_discount_percentage: group.recommended_discount_percentage,
                    countries: group.countries.clone(),
                    discount,
                }
            })
            .collect())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.write().await;
        let (id, created_at) = tables.next_id("prod");

        let product = Product {
            id,
            user_id: product.user_id,
            name: product.name,
            url: product.url,
            description: product.description,
            created_at,
        };
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn insert_default_customization(&self, product_id: &str) -> Result<(), RepositoryError> {
        if self.fail_customization_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError("customization insert failed".to_string()));
        }

        let mut tables = self.tables.write().await;
        tables
            .customizations
            .entry(product_id.to_string())
            .or_insert_with(|| ProductCustomization::new(product_id));
        Ok(())
    }

    async fn update_product(
        &self,
        id: &str,
        user_id: &str,
        update: ProductUpdate,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;

        let Some(product) = tables
            .products
            .iter_mut()
            .find(|p| p.id == id && p.user_id == user_id)
        else {
            return Ok(0);
        };

        if let Some(name) = update.name {
            product.name = name;
        }
        if let Some(url) = update.url {
            product.url = url;
        }
        if let Some(description) = update.description {
            product.description = Some(description);
        }
        Ok(1)
    }

    async fn delete_product(&self, id: &str, user_id: &str) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;

        let before = tables.products.len();
        tables
            .products
            .retain(|p| !(p.id == id && p.user_id == user_id));
        let removed = (before - tables.products.len()) as u64;

        if removed > 0 {
            tables.customizations.remove(id);
            tables.discounts.retain(|(pid, _)| pid != id);
        }
        Ok(removed)
    }

    async fn update_country_discounts(
        &self,
        product_id: &str,
        user_id: &str,
        delete_group_ids: Vec<String>,
        upserts: Vec<CountryGroupDiscount>,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.owns(product_id, user_id) {
            return Ok(0);
        }

        let before = tables.discounts.len();
        tables.discounts.retain(|(pid, d)| {
            !(pid == product_id && delete_group_ids.contains(&d.country_group_id))
        });
        let mut changed = (before - tables.discounts.len()) as u64;

        for discount in upserts {
            let existing = tables
                .discounts
                .iter_mut()
                .find(|(pid, d)| pid == product_id && d.country_group_id == discount.country_group_id);
            match existing {
                Some((_, current)) => *current = discount,
                None => tables.discounts.push((product_id.to_string(), discount)),
            }
            changed += 1;
        }
        Ok(changed)
    }

    async fn product_customization(
        &self,
        product_id: &str,
        user_id: &str,
    ) -> Result<Option<ProductCustomization>, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;
        if !tables.owns(product_id, user_id) {
            return Ok(None);
        }

        Ok(tables.customizations.get(product_id).cloned())
    }

    async fn update_product_customization(
        &self,
        customization: ProductCustomization,
        user_id: &str,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.owns(&customization.product_id, user_id) {
            return Ok(0);
        }

        tables
            .customizations
            .insert(customization.product_id.clone(), customization);
        Ok(1)
    }

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSubscription>, RepositoryError> {
        self.record_read()?;
        let tables = self.tables.read().await;

        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn insert_subscription(
        &self,
        user_id: &str,
        tier: SubscriptionTier,
    ) -> Result<Option<UserSubscription>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.iter().any(|s| s.user_id == user_id) {
            return Ok(None);
        }

        let (id, _) = tables.next_id("sub");
        let subscription = UserSubscription {
            id,
            user_id: user_id.to_string(),
            tier,
        };
        tables.subscriptions.push(subscription.clone());
        Ok(Some(subscription))
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<DeletedUser, RepositoryError> {
        let mut tables = self.tables.write().await;

        let subscription_ids = tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id.clone())
            .collect();
        tables.subscriptions.retain(|s| s.user_id != user_id);

        let product_ids: Vec<String> = tables
            .products
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id.clone())
            .collect();
        tables.products.retain(|p| p.user_id != user_id);
        for id in &product_ids {
            tables.customizations.remove(id);
        }
        tables.discounts.retain(|(pid, _)| !product_ids.contains(pid));

        Ok(DeletedUser {
            subscription_ids,
            product_ids,
        })
    }
}
