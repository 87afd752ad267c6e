//! Per-handler caching policy.
//!
//! Handlers are named by a [`HandlerId`]; at startup each cached handler is
//! bound to a [`CachePolicy`] in a [`PolicyTable`]. Handlers without a binding
//! are simply not cached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::key::{CacheKey, KeyBuilder};
use super::ttl::Ttl;
use crate::context::{PathParams, QueryParams};
use crate::pagination::PageQuery;

/// Stable name of a handler, e.g. `"users.find_one"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    /// Names a handler. By convention `{resource}.{action}`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The handler name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Key derivation for [`KeyStrategy::Custom`].
pub type KeyFn = Arc<dyn Fn(&KeyBuilder, &PathParams, &QueryParams) -> CacheKey + Send + Sync>;

/// How a request maps to its cache key.
#[derive(Clone)]
pub enum KeyStrategy {
    /// `resource:{route param}`; a missing param keys as the empty string.
    Entity { resource: String, param: String },
    /// `resource:page-{p}:limit-{l}` from the query string.
    List { resource: String },
    Custom(KeyFn),
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity { resource, param } => f
                .debug_struct("Entity")
                .field("resource", resource)
                .field("param", param)
                .finish(),
            Self::List { resource } => f.debug_struct("List").field("resource", resource).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl KeyStrategy {
    /// Derives the cache key for one request.
    pub fn key(&self, keys: &KeyBuilder, params: &PathParams, query: &QueryParams) -> CacheKey {
        match self {
            Self::Entity { resource, param } => {
                keys.build(resource, params.get(param).unwrap_or_default())
            }
            Self::List { resource } => keys.build_list(resource, &PageQuery::from_query(query)),
            Self::Custom(f) => f(keys, params, query),
        }
    }
}

/// Immutable `{ttl, key strategy}` pair bound to one handler.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    ttl: Ttl,
    key: KeyStrategy,
}

impl CachePolicy {
    /// Policy from an explicit strategy.
    pub fn new(ttl: Ttl, key: KeyStrategy) -> Self {
        Self { ttl, key }
    }

    /// Single entity addressed by route parameter `param`.
    pub fn entity(ttl: Ttl, resource: impl Into<String>, param: impl Into<String>) -> Self {
        Self::new(
            ttl,
            KeyStrategy::Entity {
                resource: resource.into(),
                param: param.into(),
            },
        )
    }

    /// Paginated collection keyed by `page`/`limit`.
    pub fn list(ttl: Ttl, resource: impl Into<String>) -> Self {
        Self::new(
            ttl,
            KeyStrategy::List {
                resource: resource.into(),
            },
        )
    }

    /// Policy whose key comes from `key`. The function must be pure: equal
    /// inputs must give equal keys, distinct requests distinct keys.
    pub fn custom<F>(ttl: Ttl, key: F) -> Self
    where
        F: Fn(&KeyBuilder, &PathParams, &QueryParams) -> CacheKey + Send + Sync + 'static,
    {
        Self::new(ttl, KeyStrategy::Custom(Arc::new(key)))
    }

    /// Expiry applied when populating.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Derives the cache key for one request.
    pub fn key(&self, keys: &KeyBuilder, params: &PathParams, query: &QueryParams) -> CacheKey {
        self.key.key(keys, params, query)
    }
}

/// Startup-time registry of handler → policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<HandlerId, CachePolicy>,
}

impl PolicyTable {
    /// An empty table; every handler passes through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `policy` to `handler`, replacing any earlier binding.
    #[must_use]
    pub fn bind(mut self, handler: impl Into<HandlerId>, policy: CachePolicy) -> Self {
        self.policies.insert(handler.into(), policy);
        self
    }

    /// Policy bound to `handler`, or `None` for uncached handlers.
    pub fn resolve(&self, handler: &HandlerId) -> Option<&CachePolicy> {
        self.policies.get(handler)
    }

    /// Number of bound handlers.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Ttl {
        Ttl::new(30).unwrap()
    }

    #[test]
    fn entity_strategy_reads_route_param() {
        let keys = KeyBuilder::new("app", "v1");
        let policy = CachePolicy::entity(ttl(), "users", "id");
        let params: PathParams = [("id", "42")].into_iter().collect();
        let key = policy.key(&keys, &params, &QueryParams::new());
        assert_eq!(key.as_str(), "app:v1:users:42");
    }

    #[test]
    fn list_strategy_reads_query() {
        let keys = KeyBuilder::new("app", "v1");
        let policy = CachePolicy::list(ttl(), "products");
        let query: QueryParams = [("page", "2")].into_iter().collect();
        let key = policy.key(&keys, &PathParams::new(), &query);
        assert_eq!(key.as_str(), "app:v1:products:page-2:limit-10");
    }

    #[test]
    fn custom_strategy_is_called() {
        let keys = KeyBuilder::new("app", "v1");
        let policy = CachePolicy::custom(ttl(), |keys, params, _| {
            keys.build("orders", params.get("user").unwrap_or("anon"))
        });
        let key = policy.key(&keys, &PathParams::new(), &QueryParams::new());
        assert_eq!(key.as_str(), "app:v1:orders:anon");
    }

    #[test]
    fn unbound_handlers_resolve_to_none() {
        let table = PolicyTable::new().bind("users.find_one", CachePolicy::entity(ttl(), "users", "id"));
        assert_eq!(table.len(), 1);
        assert!(table.resolve(&HandlerId::from("users.find_one")).is_some());
        assert!(table.resolve(&HandlerId::from("users.create")).is_none());
    }
}
