//! Product catalog data access over the tag cache.
//!
//! Every read goes through [`TagCache::wrap`] with the tags it depends on, and
//! every successful mutation revalidates the tags it touched before returning.
//! Scopes are validated before the write. Once a write is committed, a failed
//! invalidation is logged and the write still succeeds.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tag_cache::catalog::{
//!     Catalog, InMemoryRepository, NewProduct, SubscriptionTier, TierCapabilities,
//! };
//! use tag_cache::{CacheBuilder, MokaStore, MokaStoreConfig};
//!
//! let tiers = |tier: SubscriptionTier| TierCapabilities {
//!     name: format!("{:?}", tier),
//!     max_number_of_products: if tier == SubscriptionTier::Free { 1 } else { 30 },
//!     max_number_of_visits: 5_000,
//!     can_access_analytics: tier != SubscriptionTier::Free,
//!     can_customize_banner: tier != SubscriptionTier::Free,
//!     can_remove_branding: tier == SubscriptionTier::Premium,
//! };
//!
//! let cache = CacheBuilder::new()
//!     .tier(Arc::new(MokaStore::new(MokaStoreConfig::default())))
//!     .build();
//! let catalog = Catalog::new(cache, Arc::new(InMemoryRepository::new()), Arc::new(tiers));
//!
//! let recent = catalog.products.get_products("user_1", Some(6)).await?;
//! catalog.products.create_product(new_product).await?;
//! // Served from the database again, including the new product.
//! let recent = catalog.products.get_products("user_1", Some(6)).await?;
//! ```

mod memory;
mod permissions;
mod products;
mod repository;
mod subscriptions;
mod users;
mod webhook;

use std::sync::Arc;

use crate::cache::TagCache;
use crate::error::CacheError;
use crate::tag::ResourceKind;

pub use memory::InMemoryRepository;
pub use permissions::Permissions;
pub use products::{CountryDiscountInput, ProductService};
pub use repository::{
    Country, CountryDiscount, CountryGroup, CountryGroupDiscount, DeletedUser, NewProduct,
    Product, ProductCountryGroup, ProductCustomization, ProductUpdate, Repository,
    RepositoryError, SubscriptionTier, UserSubscription,
};
pub use subscriptions::{SubscriptionService, TierCapabilities, TierPolicy};
pub use users::UserService;
pub use webhook::{LifecycleEvent, UserPayload, WebhookHandler};

/// Error type for catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The database failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// A scope was invalid, or a cached read failed its scope check.
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("user '{0}' has no subscription")]
    NoSubscription(String),
    /// A webhook payload could not be decoded.
    #[error("invalid webhook event: {0}")]
    InvalidEvent(String),
}

/// Settle the invalidation that follows a committed write.
///
/// Returns the number of entries removed, or zero when the invalidation
/// failed. Readers may then see stale data until the next write to the same
/// tags.
pub(crate) fn after_commit(kind: ResourceKind, result: Result<usize, CacheError>) -> usize {
    match result {
        Ok(removed) => removed,
        Err(e) => {
            tracing::warn!(
                "Write committed but cache not invalidated: kind={}, error={}",
                kind,
                e
            );
            0
        }
    }
}

/// All catalog services, sharing one cache and one repository.
#[derive(Clone)]
pub struct Catalog {
    pub products: ProductService,
    pub subscriptions: SubscriptionService,
    pub users: UserService,
    pub permissions: Permissions,
    pub webhooks: WebhookHandler,
}

impl Catalog {
    pub fn new(
        cache: TagCache,
        repository: Arc<dyn Repository>,
        tiers: Arc<dyn TierPolicy>,
    ) -> Self {
        let products = ProductService::new(cache.clone(), repository.clone());
        let subscriptions = SubscriptionService::new(cache.clone(), repository.clone(), tiers);
        let users = UserService::new(cache, repository);
        let permissions = Permissions::new(products.clone(), subscriptions.clone());
        let webhooks = WebhookHandler::new(subscriptions.clone(), users.clone());

        Catalog {
            products,
            subscriptions,
            users,
            permissions,
            webhooks,
        }
    }
}
