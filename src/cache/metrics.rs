//! Cache hit/miss metrics.
//!
//! Two sets of counters exist. The interceptor feeds process-local counters
//! through [`CacheMetrics::record_hit`]/[`record_miss`](CacheMetrics::record_miss);
//! they are advisory. The reported numbers in [`MetricsSnapshot`] come from the
//! backend's own `keyspace_hits`/`keyspace_misses`, which cover every client
//! sharing the backend, not just this process.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::client::CacheClient;
use super::store::parse_info;
use crate::context::Context;
use crate::router::Router;
use crate::{Response, StatusCode};

/// Confirmation returned by [`CacheMetrics::reset`] and its endpoint.
pub const RESET_MESSAGE: &str = "Cache metrics reset successfully";

/// Point-in-time view of cache effectiveness. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, two decimals; 0 without traffic.
    pub hit_rate_percent: f64,
    pub total_keys: u64,
    pub memory_used_human: String,
}

/// Process-local counters, as recorded by this process's interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalCounts {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Serialize)]
struct ResetBody {
    message: &'static str,
}

/// `hits / (hits + misses) * 100` rounded to two decimals, `0.0` without traffic.
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Hit/miss collector shared by the interceptor and the metrics endpoints.
#[derive(Debug)]
pub struct CacheMetrics {
    client: CacheClient,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheMetrics {
    /// Collector reading backend statistics through `client`, with zeroed local counters.
    pub fn new(client: CacheClient) -> Self {
        Self {
            client,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Counts one hit served by this process.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one miss seen by this process.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Process-local counts since start or the last reset. Advisory only; the
    /// snapshot reports the backend's counters.
    pub fn local(&self) -> LocalCounts {
        LocalCounts {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Builds a snapshot from `INFO stats`, `INFO memory` and `DBSIZE`.
    ///
    /// When the backend cannot answer, hits and misses fall back to the local
    /// counters, `totalKeys` to 0 and memory to `"N/A"`.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let (hits, misses) = match self.client.info("stats").await {
            Some(raw) => {
                let stats = parse_info(&raw);
                let counter = |name: &str| {
                    stats
                        .get(name)
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0)
                };
                (counter("keyspace_hits"), counter("keyspace_misses"))
            }
            None => {
                let local = self.local();
                warn!("backend stats unavailable, reporting process-local counters");
                (local.hits, local.misses)
            }
        };

        let memory_used_human = self
            .client
            .info("memory")
            .await
            .and_then(|raw| {
                let memory = parse_info(&raw);
                memory.get("used_memory_human").map(|v| (*v).to_owned())
            })
            .unwrap_or_else(|| "N/A".to_owned());

        MetricsSnapshot {
            hits,
            misses,
            hit_rate_percent: hit_rate_percent(hits, misses),
            total_keys: self.client.db_size().await.unwrap_or(0),
            memory_used_human,
        }
    }

    /// Resets the backend's native counters and the local ones. Safe to call
    /// repeatedly and with no prior traffic.
    pub async fn reset(&self) -> &'static str {
        let backend = self.client.reset_stats().await;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        info!(backend, "cache metrics reset");
        RESET_MESSAGE
    }

    /// Registers `GET {base}` (snapshot) and `POST {base}/reset`.
    pub fn routes(self: &Arc<Self>, router: &mut Router, base: &str) {
        let base = base.trim_end_matches('/');

        let metrics = Arc::clone(self);
        router.get(base, move |_ctx: Context| {
            let metrics = Arc::clone(&metrics);
            async move { Response::json(StatusCode::Ok, &metrics.snapshot().await) }
        });

        let metrics = Arc::clone(self);
        router.post(&format!("{base}/reset"), move |_ctx: Context| {
            let metrics = Arc::clone(&metrics);
            async move {
                let message = metrics.reset().await;
                Response::json(StatusCode::Ok, &ResetBody { message })
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyBuilder, MemoryStore, Ttl};
    use crate::{Method, Request};

    fn setup() -> (Arc<MemoryStore>, CacheClient, Arc<CacheMetrics>) {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store.clone());
        let metrics = Arc::new(CacheMetrics::new(client.clone()));
        (store, client, metrics)
    }

    #[test]
    fn hit_rate_rounding() {
        assert_eq!(hit_rate_percent(0, 0), 0.0);
        assert_eq!(hit_rate_percent(3, 1), 75.0);
        assert_eq!(hit_rate_percent(1, 2), 33.33);
        assert_eq!(hit_rate_percent(2, 1), 66.67);
    }

    #[tokio::test]
    async fn snapshot_reads_backend_counters() {
        let (_, client, metrics) = setup();
        let keys = KeyBuilder::new("t", "v1");
        let key = keys.build("users", 1);
        client.set(&key, "{}", Ttl::new(60).unwrap()).await;
        for _ in 0..3 {
            client.get(&key).await;
        }
        client.get(&keys.build("users", 2)).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.hit_rate_percent, 75.0);
        assert_eq!(snapshot.total_keys, 1);
        assert_ne!(snapshot.memory_used_human, "N/A");
    }

    #[tokio::test]
    async fn empty_backend_reports_zero_rate() {
        let (_, _, metrics) = setup();
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.hits + snapshot.misses, 0);
        assert_eq!(snapshot.hit_rate_percent, 0.0);
    }

    #[tokio::test]
    async fn disconnected_backend_falls_back_to_local_counts() {
        let (store, _, metrics) = setup();
        metrics.record_hit();
        metrics.record_miss();
        store.disconnect();

        let snapshot = metrics.snapshot().await;
        assert_eq!((snapshot.hits, snapshot.misses), (1, 1));
        assert_eq!(snapshot.hit_rate_percent, 50.0);
        assert_eq!(snapshot.total_keys, 0);
        assert_eq!(snapshot.memory_used_human, "N/A");
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let (_, client, metrics) = setup();
        assert_eq!(metrics.reset().await, RESET_MESSAGE);

        client.get(&KeyBuilder::new("t", "v1").build("users", 1)).await;
        metrics.record_miss();
        assert_eq!(metrics.reset().await, RESET_MESSAGE);
        assert_eq!(metrics.reset().await, RESET_MESSAGE);

        assert_eq!(metrics.local(), LocalCounts::default());
        let snapshot = metrics.snapshot().await;
        assert_eq!((snapshot.hits, snapshot.misses), (0, 0));
    }

    #[tokio::test]
    async fn snapshot_serializes_with_wire_names() {
        let (_, _, metrics) = setup();
        let value = serde_json::to_value(metrics.snapshot().await).unwrap();
        let mut fields: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            ["hitRatePercent", "hits", "memoryUsedHuman", "misses", "totalKeys"]
        );
    }

    #[tokio::test]
    async fn endpoints_are_registered() {
        let (_, _, metrics) = setup();
        let mut router = Router::new();
        metrics.routes(&mut router, "/cache/metrics/");

        let res = router.route(Request::new(Method::Get, "/cache/metrics")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["hitRatePercent"], 0.0);

        let res = router
            .route(Request::new(Method::Post, "/cache/metrics/reset"))
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["message"], RESET_MESSAGE);
    }
}
