//! The raw cache backend protocol.
//!
//! A [`CacheStore`] speaks the key-value commands the cache layer needs
//! (`GET`, `SET … EX`, `DEL`, `KEYS`, `DBSIZE`, `INFO`, `CONFIG RESETSTAT`) and
//! reports failures as [`CacheError`]. Stores never decide fallbacks themselves;
//! that is [`CacheClient`](super::CacheClient)'s job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use super::ttl::Ttl;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend is not connected")]
    NotConnected,

    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Result of a raw store command.
pub type CacheResult<T> = Result<T, CacheError>;

/// Connection lifecycle notifications emitted by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Error,
    Closed,
}

/// Shared healthy/unhealthy flag, written only through [`apply`](Self::apply).
#[derive(Debug, Default)]
pub struct HealthState {
    healthy: AtomicBool,
}

impl HealthState {
    /// Flag starting in the given state.
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
        }
    }

    /// Applies a lifecycle event. Returns `true` when the flag changed.
    pub fn apply(&self, event: ConnectionEvent) -> bool {
        let healthy = matches!(event, ConnectionEvent::Connected);
        self.healthy.swap(healthy, Ordering::AcqRel) != healthy
    }

    /// Whether the last lifecycle event was `Connected`.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

/// Key-value store with per-key expiry and Redis-style introspection.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Ttl) -> CacheResult<()>;

    /// Deletes `keys`, returning how many existed.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    async fn db_size(&self) -> CacheResult<u64>;

    /// Raw `INFO <section>` text (`name:value` lines).
    async fn info(&self, section: &str) -> CacheResult<String>;

    /// Resets the store's native statistics (`CONFIG RESETSTAT`).
    async fn reset_stats(&self) -> CacheResult<()>;

    fn health(&self) -> &HealthState;

    fn name(&self) -> &'static str;
}

/// Parses `INFO` output into `name → value`, skipping `#` section headers.
pub fn parse_info(raw: &str) -> HashMap<&str, &str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_follows_events() {
        let health = HealthState::default();
        assert!(!health.is_healthy());
        assert!(health.apply(ConnectionEvent::Connected));
        assert!(health.is_healthy());
        assert!(!health.apply(ConnectionEvent::Connected));
        assert!(health.apply(ConnectionEvent::Error));
        assert!(!health.is_healthy());
        assert!(!health.apply(ConnectionEvent::Closed));
    }

    #[test]
    fn info_lines_are_split() {
        let raw = "# Stats\r\nkeyspace_hits:12\r\nkeyspace_misses:3\r\n\r\n# Memory\r\nused_memory_human:1.05M\r\n";
        let info = parse_info(raw);
        assert_eq!(info.get("keyspace_hits"), Some(&"12"));
        assert_eq!(info.get("keyspace_misses"), Some(&"3"));
        assert_eq!(info.get("used_memory_human"), Some(&"1.05M"));
        assert_eq!(info.len(), 3);
    }
}
