//! Cache-aside interceptor.
//!
//! Per request:
//!
//! 1. resolve the handler's [`CachePolicy`](super::CachePolicy); unbound
//!    handlers run untouched,
//! 2. derive the key from route and query parameters,
//! 3. look it up; a readable hit is returned without calling the handler,
//! 4. on a miss call the handler, whose errors pass straight through,
//! 5. cache a present result under the key with the policy's TTL, on a
//!    background task so the response does not wait for the write,
//! 6. return the handler's result.
//!
//! Values are stored as JSON. `None` results are never cached, so a resource
//! that is missing now can appear on the next request; empty collections are
//! cached like any other value. Concurrent misses on one key each call the
//! handler and each write the key.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::client::CacheClient;
use super::key::{CacheKey, KeyBuilder};
use super::metrics::CacheMetrics;
use super::policy::{HandlerId, PolicyTable};
use super::ttl::Ttl;
use crate::context::{Context, PathParams, QueryParams};
use crate::error::ApiError;
use crate::router::IntoHandler;
use crate::{Response, StatusCode};

/// Response header reporting the [`CacheOutcome`] of a request.
pub const CACHE_HEADER: &str = "X-Cache";

/// Which path a request took through the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// No policy bound to the handler.
    Bypass,
}

impl CacheOutcome {
    /// Header value: `HIT`, `MISS` or `BYPASS`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

/// A handler result together with the path that produced it.
#[derive(Debug)]
pub struct Intercepted<T, E> {
    pub result: Result<Option<T>, E>,
    pub outcome: CacheOutcome,
}

/// Cache-aside wrapper shared by every cached route.
///
/// Built once at startup from the backend client, the key builder, the frozen
/// policy table and the metrics collector; cheap to share behind an [`Arc`].
pub struct CacheInterceptor {
    client: CacheClient,
    keys: KeyBuilder,
    policies: Arc<PolicyTable>,
    metrics: Arc<CacheMetrics>,
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("keys", &self.keys)
            .field("policies", &self.policies.len())
            .finish()
    }
}

impl CacheInterceptor {
    /// Assembles the interceptor. `policies` is not modified afterwards.
    pub fn new(
        client: CacheClient,
        keys: KeyBuilder,
        policies: Arc<PolicyTable>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            client,
            keys,
            policies,
            metrics,
        }
    }

    /// The collector fed with hits and misses.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Runs `handler` behind the cache and returns its (possibly cached) result.
    pub async fn intercept<T, E, F, Fut>(
        &self,
        handler_id: &HandlerId,
        params: &PathParams,
        query: &QueryParams,
        handler: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.execute(handler_id, params, query, handler).await.result
    }

    /// Like [`intercept`](Self::intercept), also reporting the [`CacheOutcome`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        handler_id: &HandlerId,
        params: &PathParams,
        query: &QueryParams,
        handler: F,
    ) -> Intercepted<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let Some(policy) = self.policies.resolve(handler_id) else {
            debug!(handler = %handler_id, "no cache policy, passing through");
            return Intercepted {
                result: handler().await,
                outcome: CacheOutcome::Bypass,
            };
        };

        let key = policy.key(&self.keys, params, query);

        if let Some(raw) = self.client.get(&key).await {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.metrics.record_hit();
                    debug!(handler = %handler_id, key = %key, "cache hit");
                    return Intercepted {
                        result: Ok(Some(value)),
                        outcome: CacheOutcome::Hit,
                    };
                }
                Err(e) => warn!(
                    handler = %handler_id,
                    key = %key,
                    error = %e,
                    "unreadable cache entry, treating as miss"
                ),
            }
        }

        self.metrics.record_miss();
        debug!(handler = %handler_id, key = %key, "cache miss");

        let result = handler().await;
        let payload = match &result {
            Ok(Some(value)) => Some(serde_json::to_string(value)),
            _ => None,
        };
        if let Some(payload) = payload {
            self.populate(key, payload, policy.ttl());
        }

        Intercepted {
            result,
            outcome: CacheOutcome::Miss,
        }
    }

    /// Writes the entry on a background task; the response never waits for it.
    fn populate(&self, key: CacheKey, payload: serde_json::Result<String>, ttl: Ttl) {
        let json = match payload {
            Ok(json) if json == "null" => {
                debug!(key = %key, "null result, not cached");
                return;
            }
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize result for cache");
                return;
            }
        };
        let client = self.client.clone();
        tokio::spawn(async move { client.set(&key, &json, ttl).await });
    }

    /// Wraps a JSON API handler for registration on a [`Router`](crate::router::Router).
    ///
    /// `Ok(Some(v))` renders `200` with `v`, `Ok(None)` renders `200` with
    /// `null`, and `Err(e)` renders through [`ApiError::into_response`]. Every
    /// response carries an `X-Cache` header.
    pub fn json<T, H, Fut>(
        self: &Arc<Self>,
        handler_id: impl Into<HandlerId>,
        handler: H,
    ) -> impl IntoHandler
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        H: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, ApiError>> + Send + 'static,
    {
        let interceptor = Arc::clone(self);
        let handler_id = handler_id.into();
        let handler = Arc::new(handler);

        move |ctx: Context| {
            let interceptor = Arc::clone(&interceptor);
            let handler_id = handler_id.clone();
            let handler = Arc::clone(&handler);
            async move {
                let params = ctx.params().clone();
                let query = ctx.query().clone();
                let intercepted = interceptor
                    .execute(&handler_id, &params, &query, move || (*handler)(ctx))
                    .await;
                render(intercepted)
            }
        }
    }
}

fn render<T: Serialize>(intercepted: Intercepted<T, ApiError>) -> Response {
    let mut response = match intercepted.result {
        Ok(Some(value)) => Response::json(StatusCode::Ok, &value),
        Ok(None) => Response::json(StatusCode::Ok, &serde_json::Value::Null),
        Err(e) => e.into_response(),
    };
    response.set_header(CACHE_HEADER, intercepted.outcome.as_str());
    response
}
