//! Cache key construction.
//!
//! Every key has the shape `{namespace}:{version}:{resource}:{suffix}`:
//!
//! - `namespace` isolates applications sharing one backend,
//! - `version` invalidates everything at once when bumped,
//! - `resource` groups keys for pattern operations,
//! - `suffix` is an identifier, or `page-{p}:limit-{l}` for collections.
//!
//! Keys are pure functions of their inputs. Identifiers are escaped (`%` to
//! `%25`, `:` to `%3A`) so one can never span segments or spell a list suffix.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pagination::PageQuery;

/// An opaque cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builds namespaced, versioned cache keys.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::KeyBuilder;
/// use rttp_cache::pagination::PageQuery;
///
/// let keys = KeyBuilder::new("shop", "v1");
/// assert_eq!(keys.build("users", 42).as_str(), "shop:v1:users:42");
/// assert_eq!(
///     keys.build_list("products", &PageQuery::default()).as_str(),
///     "shop:v1:products:page-1:limit-10",
/// );
/// assert_eq!(keys.pattern_all("users"), "shop:v1:users:*");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    /// Keys prefixed with `{namespace}:{version}`. Bumping `version` orphans
    /// every key built under the old one.
    pub fn new(namespace: impl fmt::Display, version: impl fmt::Display) -> Self {
        Self {
            prefix: format!("{namespace}:{version}"),
        }
    }

    /// Key for a single entity, from the identifier's string form.
    pub fn build(&self, resource: &str, identifier: impl fmt::Display) -> CacheKey {
        let identifier = identifier.to_string();
        CacheKey(format!(
            "{}:{resource}:{}",
            self.prefix,
            escape_identifier(&identifier)
        ))
    }

    /// Key for one page of a collection. Missing page/limit resolve to their
    /// defaults first, so implicit and explicit defaults share a key.
    pub fn build_list(&self, resource: &str, query: &PageQuery) -> CacheKey {
        CacheKey(format!(
            "{}:{resource}:page-{}:limit-{}",
            self.prefix,
            query.page(),
            query.limit()
        ))
    }

    /// Glob pattern over a resource's keys, for `KEYS`/bulk deletion.
    pub fn pattern(&self, resource: &str, wildcard: &str) -> String {
        format!("{}:{resource}:{wildcard}", self.prefix)
    }

    /// Pattern matching every key of `resource`.
    pub fn pattern_all(&self, resource: &str) -> String {
        self.pattern(resource, "*")
    }
}

fn escape_identifier(identifier: &str) -> Cow<'_, str> {
    if !identifier.contains([':', '%']) {
        return Cow::Borrowed(identifier);
    }
    let mut escaped = String::with_capacity(identifier.len() + 4);
    for c in identifier.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
