//! Cache-aside caching for read handlers.
//!
//! ## Layout
//!
//! - [`key`]: namespaced, versioned [`CacheKey`]s.
//! - [`ttl`]: per-resource [`Ttl`]s grouped into [`TtlTier`]s.
//! - [`store`]: the raw [`CacheStore`] protocol and connection health.
//! - [`redis`](self::redis) / [`memory`]: the two store implementations.
//! - [`client`]: [`CacheClient`], which absorbs every backend failure.
//! - [`policy`]: handler → [`CachePolicy`] bindings.
//! - [`interceptor`]: the lookup / populate state machine.
//! - [`metrics`]: hit and miss reporting.
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rttp_cache::cache::{
//!     CacheClient, CacheInterceptor, CacheMetrics, CachePolicy, PolicyTable, RedisStore, TtlTier,
//! };
//! use rttp_cache::config::CacheConfig;
//!
//! # async fn wire() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::from_env()?;
//! let keys = config.key_builder();
//! let store = Arc::new(RedisStore::connect(config).await?);
//! let client = CacheClient::new(store.clone());
//! let metrics = Arc::new(CacheMetrics::new(client.clone()));
//!
//! let policies = PolicyTable::new()
//!     .bind("users.find_one", CachePolicy::entity(TtlTier::Stable.ttl(), "users", "id"));
//! let cache = Arc::new(CacheInterceptor::new(client, keys, Arc::new(policies), metrics));
//! # let _ = cache;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod interceptor;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod policy;
pub mod redis;
pub mod store;
pub mod ttl;

pub use client::CacheClient;
pub use interceptor::{CACHE_HEADER, CacheInterceptor, CacheOutcome, Intercepted};
pub use key::{CacheKey, KeyBuilder};
pub use memory::MemoryStore;
pub use metrics::{CacheMetrics, LocalCounts, MetricsSnapshot};
pub use policy::{CachePolicy, HandlerId, KeyStrategy, PolicyTable};
pub use self::redis::RedisStore;
pub use store::{CacheError, CacheResult, CacheStore, ConnectionEvent, HealthState};
pub use ttl::{PolicyError, Ttl, TtlTable, TtlTier};
