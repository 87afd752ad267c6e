//! Per-resource expiry.
//!
//! TTLs follow three tiers: rarely-changing entities live for about an hour,
//! entities that change more often for minutes, and collection pages (whose
//! membership moves fastest) for about a minute. The table is fixed at startup.
//!
//! Entity TTLs are stored under the resource name used in cache keys
//! (`users`); a resource's listing TTL under `{resource}:list`. Entity and list
//! keys share the resource segment, so [`TtlTable::entity`] and
//! [`TtlTable::list`] take that same name.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("cache TTL must be at least one second")]
    ZeroTtl,
}

/// A positive number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ttl(NonZeroU64);

impl Ttl {
    /// Fails with [`PolicyError::ZeroTtl`] for `0`.
    pub fn new(seconds: u64) -> Result<Self, PolicyError> {
        NonZeroU64::new(seconds).map(Self).ok_or(PolicyError::ZeroTtl)
    }

    /// Whole seconds, as sent with `SET … EX`.
    pub const fn seconds(self) -> u64 {
        self.0.get()
    }

    /// The TTL as a [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}

/// Staleness tolerance tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlTier {
    /// High-read, low-change entities.
    Stable,
    /// Entities that change regularly.
    Moderate,
    /// Collection and listing endpoints.
    Listing,
}

impl TtlTier {
    /// The tier's TTL: one hour, ten minutes or one minute.
    pub const fn ttl(self) -> Ttl {
        let seconds = match self {
            Self::Stable => 3600,
            Self::Moderate => 600,
            Self::Listing => 60,
        };
        match NonZeroU64::new(seconds) {
            Some(s) => Ttl(s),
            None => unreachable!(),
        }
    }
}

/// Resource tag → TTL.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{TtlTable, TtlTier};
///
/// let table = TtlTable::new()
///     .with_tier("users", TtlTier::Stable)
///     .with_list_tier("users", TtlTier::Listing);
///
/// assert_eq!(table.entity("users").map(|t| t.seconds()), Some(3600));
/// assert_eq!(table.list("users").map(|t| t.seconds()), Some(60));
/// assert!(table.entity("orders").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TtlTable {
    by_resource: HashMap<String, Ttl>,
}

/// Table tag holding the listing TTL of `resource`.
pub fn list_tag(resource: &str) -> String {
    format!("{resource}:list")
}

impl TtlTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Users and products as entities plus their listings.
    pub fn standard() -> Self {
        Self::new()
            .with_tier("users", TtlTier::Stable)
            .with_tier("products", TtlTier::Moderate)
            .with_list_tier("users", TtlTier::Listing)
            .with_list_tier("products", TtlTier::Listing)
    }

    /// Sets the TTL stored under `resource`, replacing an earlier one.
    #[must_use]
    pub fn with(mut self, resource: impl Into<String>, ttl: Ttl) -> Self {
        self.by_resource.insert(resource.into(), ttl);
        self
    }

    #[must_use]
    pub fn with_tier(self, resource: impl Into<String>, tier: TtlTier) -> Self {
        self.with(resource, tier.ttl())
    }

    /// Sets the listing TTL of `resource`.
    #[must_use]
    pub fn with_list_tier(self, resource: &str, tier: TtlTier) -> Self {
        self.with(list_tag(resource), tier.ttl())
    }

    /// Raw lookup by table tag.
    pub fn get(&self, tag: &str) -> Option<Ttl> {
        self.by_resource.get(tag).copied()
    }

    /// TTL for single entities of `resource`.
    pub fn entity(&self, resource: &str) -> Option<Ttl> {
        self.get(resource)
    }

    /// TTL for collection pages of `resource`.
    pub fn list(&self, resource: &str) -> Option<Ttl> {
        self.get(&list_tag(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_rejected() {
        assert_eq!(Ttl::new(0), Err(PolicyError::ZeroTtl));
        assert_eq!(Ttl::new(5).unwrap().as_duration(), Duration::from_secs(5));
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(TtlTier::Stable.ttl() > TtlTier::Moderate.ttl());
        assert!(TtlTier::Moderate.ttl() > TtlTier::Listing.ttl());
    }

    #[test]
    fn standard_table_lists_expire_first() {
        let table = TtlTable::standard();
        let users = table.get("users").unwrap();
        let listing = table.get("users:list").unwrap();
        assert!(listing < users);
        assert_eq!(table.get("products"), Some(TtlTier::Moderate.ttl()));
    }

    #[test]
    fn entity_and_list_lookups_share_the_key_resource() {
        let table = TtlTable::standard();
        assert_eq!(table.entity("users"), Some(TtlTier::Stable.ttl()));
        assert_eq!(table.list("users"), Some(TtlTier::Listing.ttl()));
        assert_eq!(table.list("products"), table.get("products:list"));
        assert_eq!(table.list("orders"), None);
    }

    #[test]
    fn later_entries_override() {
        let table = TtlTable::new()
            .with_tier("users", TtlTier::Stable)
            .with("users", Ttl::new(1).unwrap());
        assert_eq!(table.get("users").map(Ttl::seconds), Some(1));
    }
}
