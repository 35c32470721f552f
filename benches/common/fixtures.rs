use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Test data structure for benchmarks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchProduct {
    pub id: u64,
    pub user_id: String,
    pub name: String,
    pub url: String,
}

impl BenchProduct {
    pub fn new(id: u64, user_id: &str) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            name: format!("Product {}", id),
            url: format!("https://product{}.example.com", id),
        }
    }
}

/// Simulated database with configurable latency
#[derive(Clone)]
pub struct FakeDatabase {
    products: Arc<RwLock<HashMap<String, Vec<BenchProduct>>>>,
    next_id: Arc<AtomicUsize>,
    latency_ms: u64,
    query_count: Arc<AtomicUsize>,
}

impl FakeDatabase {
    /// `num_users` users owning `per_user` products each.
    pub fn new(num_users: usize, per_user: usize, latency_ms: u64) -> Self {
        let mut products = HashMap::new();
        let mut id = 0;
        for user in 0..num_users {
            let user_id = format!("user_{}", user);
            let owned = (0..per_user)
                .map(|_| {
                    id += 1;
                    BenchProduct::new(id as u64, &user_id)
                })
                .collect();
            products.insert(user_id, owned);
        }

        Self {
            products: Arc::new(RwLock::new(products)),
            next_id: Arc::new(AtomicUsize::new(id + 1)),
            latency_ms,
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn products_for_user(&self, user_id: &str) -> Result<Vec<BenchProduct>, String> {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        // Simulate database latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        let products = self.products.read().map_err(|e| e.to_string())?;
        Ok(products.get(user_id).cloned().unwrap_or_default())
    }

    pub async fn insert_product(&self, user_id: &str) -> Result<BenchProduct, String> {
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as u64;
        let product = BenchProduct::new(id, user_id);
        let mut products = self.products.write().map_err(|e| e.to_string())?;
        products
            .entry(user_id.to_string())
            .or_default()
            .push(product.clone());
        Ok(product)
    }

    #[allow(dead_code)]
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    #[allow(dead_code)]
    pub fn reset_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }
}

/// Generate user ids for different workload patterns
pub struct UserGenerator {
    num_users: usize,
}

impl UserGenerator {
    pub fn new(num_users: usize) -> Self {
        Self { num_users }
    }

    /// Generate sequential user ids (for cold cache tests)
    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_users).map(|i| format!("user_{}", i)).collect()
    }

    /// Generate user ids with uniform distribution
    #[allow(dead_code)]
    pub fn uniform_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| format!("user_{}", rng.gen_range(0..self.num_users)))
            .collect()
    }

    /// Generate user ids with Zipf distribution (realistic - few hot users)
    pub fn zipf_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut users = Vec::with_capacity(count);

        for _ in 0..count {
            // Simplified Zipf: 80% of requests go to 20% of users
            let user = if rng.gen_bool(0.8) {
                rng.gen_range(0..(self.num_users / 5))
            } else {
                rng.gen_range((self.num_users / 5)..self.num_users)
            };
            users.push(format!("user_{}", user));
        }

        users
    }

    /// A stream of operations where `write_ratio` of them are writes.
    pub fn read_write_mix(&self, count: usize, write_ratio: f64) -> Vec<(String, bool)> {
        let mut rng = rand::thread_rng();
        self.zipf_random(count)
            .into_iter()
            .map(|user| (user, rng.gen_bool(write_ratio)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn test_fake_database() {
        use super::FakeDatabase;

        let db = FakeDatabase::new(10, 3, 1);

        let products = db.products_for_user("user_0").await.unwrap();
        assert_eq!(products.len(), 3);
        assert_eq!(db.query_count(), 1);

        db.insert_product("user_0").await.unwrap();
        assert_eq!(db.products_for_user("user_0").await.unwrap().len(), 4);
    }

    #[test]
    fn test_user_generator() {
        use super::UserGenerator;

        let users = UserGenerator::new(100);

        let seq = users.sequential();
        assert_eq!(seq.len(), 100);
        assert_eq!(seq[0], "user_0");

        assert_eq!(users.uniform_random(50).len(), 50);
        assert_eq!(users.zipf_random(100).len(), 100);

        let mix = users.read_write_mix(200, 0.0);
        assert!(mix.iter().all(|(_, write)| !write));
    }
}
