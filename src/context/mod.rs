//! Per-request context: the request plus the parameters a cache key is derived from.
//!
//! Route parameters come from the router's pattern match (`/users/:id`), query
//! parameters from the decoded request target. Both are plain name → string maps.

use std::collections::HashMap;

use crate::Request;

macro_rules! string_map {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Default, Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            map: HashMap<String, String>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
                self.map.insert(key.into(), value.into());
            }

            pub fn get(&self, key: &str) -> Option<&str> {
                self.map.get(key).map(String::as_str)
            }

            pub fn len(&self) -> usize {
                self.map.len()
            }

            pub fn is_empty(&self) -> bool {
                self.map.is_empty()
            }
        }

        impl<K, V> FromIterator<(K, V)> for $name
        where
            K: Into<String>,
            V: Into<String>,
        {
            fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                Self {
                    map: iter
                        .into_iter()
                        .map(|(k, v)| (k.into(), v.into()))
                        .collect(),
                }
            }
        }
    };
}

string_map!(
    /// Path parameters extracted from the matched route.
    PathParams
);

string_map!(
    /// Decoded query-string parameters. Repeated names keep the last value.
    QueryParams
);

/// Per-request context handed to every handler and middleware.
#[derive(Debug, Clone)]
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Context for a request whose route matched with `params`.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn query(&self) -> &QueryParams {
        self.request.query()
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn query_comes_from_request() {
        let ctx = Context::new(Request::new(Method::Get, "/items?page=4"));
        assert_eq!(ctx.query().get("page"), Some("4"));
        assert!(ctx.params().is_empty());
    }

    #[test]
    fn collect_into_params() {
        let params: PathParams = [("id", "7")].into_iter().collect();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.len(), 1);
    }
}
