//! Resilient cache client.
//!
//! Wraps a [`CacheStore`] so that no cache failure ever reaches the caller:
//! each operation checks connection health first and skips the call while the
//! backend is down, and any error is logged with its key and operation and
//! turned into the operation's fallback value.

use std::sync::Arc;

use tracing::{debug, warn};

use super::key::CacheKey;
use super::store::{CacheError, CacheStore};
use super::ttl::Ttl;

/// Cloneable handle to the process-wide cache backend.
///
/// | Operation       | Fallback on failure |
/// |-----------------|---------------------|
/// | `get`           | `None`              |
/// | `set`/`delete`  | no-op               |
/// | `keys`          | empty list          |
/// | `db_size`/`info`| `None`              |
/// | `reset_stats`   | `false`             |
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("store", &self.store.name())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

impl CacheClient {
    /// Wraps `store`; every clone shares the same backend connection.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Current connection health, as last reported by the store's lifecycle events.
    pub fn is_healthy(&self) -> bool {
        self.store.health().is_healthy()
    }

    fn available(&self, op: &'static str, target: &str) -> bool {
        let healthy = self.is_healthy();
        if !healthy {
            debug!(
                store = self.store.name(),
                op,
                target,
                "cache backend unhealthy, skipping"
            );
        }
        healthy
    }

    fn absorb(&self, op: &'static str, target: &str, error: &CacheError) {
        match error {
            CacheError::NotConnected => {
                warn!(store = self.store.name(), op, target, "cache backend not connected")
            }
            other => warn!(
                store = self.store.name(),
                op,
                target,
                error = %other,
                "cache operation failed"
            ),
        }
    }

    /// Cached value at `key`; `None` when absent, expired, or unreachable.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.available("GET", key.as_str()) {
            return None;
        }
        match self.store.get(key.as_str()).await {
            Ok(value) => value,
            Err(e) => {
                self.absorb("GET", key.as_str(), &e);
                None
            }
        }
    }

    /// Best-effort write with expiry. Concurrent writers race; the last one wins.
    pub async fn set(&self, key: &CacheKey, value: &str, ttl: Ttl) {
        if !self.available("SET", key.as_str()) {
            return;
        }
        match self.store.set_ex(key.as_str(), value, ttl).await {
            Ok(()) => debug!(key = %key, ttl = ttl.seconds(), "cache set"),
            Err(e) => self.absorb("SET", key.as_str(), &e),
        }
    }

    /// Best-effort removal of a single key.
    pub async fn delete(&self, key: &CacheKey) {
        self.delete_many(std::slice::from_ref(key)).await;
    }

    /// Best-effort removal of `keys` in one `DEL`. An empty slice is a no-op.
    pub async fn delete_many(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        let target = keys
            .iter()
            .map(CacheKey::as_str)
            .collect::<Vec<_>>()
            .join(",");
        if !self.available("DEL", &target) {
            return;
        }
        let raw: Vec<String> = keys.iter().map(|k| k.as_str().to_owned()).collect();
        match self.store.del(&raw).await {
            Ok(deleted) => debug!(keys = %target, deleted, "cache delete"),
            Err(e) => self.absorb("DEL", &target, &e),
        }
    }

    /// Keys matching a glob pattern; empty on failure.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if !self.available("KEYS", pattern) {
            return Vec::new();
        }
        self.store.keys(pattern).await.unwrap_or_else(|e| {
            self.absorb("KEYS", pattern, &e);
            Vec::new()
        })
    }

    /// Deletes every key matching `pattern`, returning how many went away.
    /// Operational tooling only; the request path never calls this.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let keys = self.keys(pattern).await;
        if keys.is_empty() {
            return 0;
        }
        match self.store.del(&keys).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.absorb("DEL", pattern, &e);
                0
            }
        }
    }

    /// Number of keys in the backend (`DBSIZE`); `None` when unavailable.
    pub async fn db_size(&self) -> Option<u64> {
        if !self.available("DBSIZE", "-") {
            return None;
        }
        self.store
            .db_size()
            .await
            .map_err(|e| self.absorb("DBSIZE", "-", &e))
            .ok()
    }

    /// Raw `INFO <section>` text; `None` when unavailable.
    pub async fn info(&self, section: &str) -> Option<String> {
        if !self.available("INFO", section) {
            return None;
        }
        self.store
            .info(section)
            .await
            .map_err(|e| self.absorb("INFO", section, &e))
            .ok()
    }

    /// `CONFIG RESETSTAT`; `true` when the backend acknowledged it.
    pub async fn reset_stats(&self) -> bool {
        if !self.available("CONFIG RESETSTAT", "-") {
            return false;
        }
        self.store
            .reset_stats()
            .await
            .map_err(|e| self.absorb("CONFIG RESETSTAT", "-", &e))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyBuilder, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, CacheClient, KeyBuilder) {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store.clone());
        (store, client, KeyBuilder::new("t", "v1"))
    }

    fn ttl() -> Ttl {
        Ttl::new(60).unwrap()
    }

    #[tokio::test]
    async fn round_trips_when_healthy() {
        let (_, client, keys) = setup();
        let key = keys.build("users", 1);
        client.set(&key, "ada", ttl()).await;
        assert_eq!(client.get(&key).await.as_deref(), Some("ada"));

        client.delete(&key).await;
        assert_eq!(client.get(&key).await, None);
    }

    #[tokio::test]
    async fn disconnected_backend_degrades_to_fallbacks() {
        let (store, client, keys) = setup();
        let key = keys.build("users", 1);
        client.set(&key, "ada", ttl()).await;

        store.disconnect();
        assert!(!client.is_healthy());
        assert_eq!(client.get(&key).await, None);
        client.set(&key, "grace", ttl()).await;
        assert!(client.keys("*").await.is_empty());
        assert_eq!(client.db_size().await, None);
        assert_eq!(client.info("stats").await, None);
        assert!(!client.reset_stats().await);

        store.reconnect();
        assert_eq!(client.get(&key).await.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn backend_errors_are_absorbed() {
        let (store, client, keys) = setup();
        let key = keys.build("users", 1);
        store.set_failing(true);
        assert!(client.is_healthy());
        assert_eq!(client.get(&key).await, None);
        client.set(&key, "ada", ttl()).await;
        client.delete(&key).await;
        assert_eq!(client.delete_pattern("*").await, 0);

        store.set_failing(false);
        assert_eq!(client.get(&key).await, None);
    }

    #[tokio::test]
    async fn delete_pattern_removes_only_matches() {
        let (_, client, keys) = setup();
        for id in 1..=3 {
            client.set(&keys.build("users", id), "u", ttl()).await;
        }
        client.set(&keys.build("products", 1), "p", ttl()).await;

        assert_eq!(client.delete_pattern(&keys.pattern_all("users")).await, 3);
        assert_eq!(client.db_size().await, Some(1));
    }
}
