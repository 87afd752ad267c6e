//! Users and products API with cache-aside reads.
//!
//! ```text
//! CACHE_REDIS_URL=redis://127.0.0.1:6379 cargo run --example cached_api
//!
//! curl -i localhost:8080/users/1            # X-Cache: MISS, then HIT
//! curl -i 'localhost:8080/products?page=2&limit=5'
//! curl localhost:8080/cache/metrics
//! curl -X POST localhost:8080/cache/metrics/reset
//! ```
//!
//! Stop Redis while it runs: responses stay correct, every request reports
//! `MISS`, and the log shows the reconnect attempts.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use rttp_cache::cache::{
    CacheClient, CacheInterceptor, CacheMetrics, CachePolicy, PolicyTable, RedisStore, TtlTable,
    TtlTier,
};
use rttp_cache::config::CacheConfig;
use rttp_cache::context::Context;
use rttp_cache::middleware::LoggerMiddleware;
use rttp_cache::pagination::{Page, PageQuery};
use rttp_cache::{ApiError, Pipeline, Response, Router, Server, StatusCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

/// Stand-in for the database behind the cached handlers.
struct Catalog {
    users: RwLock<BTreeMap<u64, User>>,
    products: RwLock<BTreeMap<u64, Product>>,
}

impl Catalog {
    fn seeded() -> Self {
        let users = (1..=25)
            .map(|id| {
                let user = User {
                    id,
                    name: format!("User {id}"),
                    email: format!("user{id}@example.com"),
                };
                (id, user)
            })
            .collect();
        let products = (1..=40)
            .map(|id| {
                let product = Product {
                    id,
                    name: format!("Product {id}"),
                    price_cents: 499 + id * 100,
                };
                (id, product)
            })
            .collect();
        Self {
            users: RwLock::new(users),
            products: RwLock::new(products),
        }
    }

    fn user(&self, id: &str) -> Result<Option<User>, ApiError> {
        let id = parse_id(id)?;
        let users = self.users.read().map_err(|_| internal())?;
        Ok(users.get(&id).cloned())
    }

    fn user_page(&self, query: PageQuery) -> Result<Option<Page<User>>, ApiError> {
        let users = self.users.read().map_err(|_| internal())?;
        Ok(Some(page_of(&users, query)))
    }

    fn product(&self, id: &str) -> Result<Option<Product>, ApiError> {
        let id = parse_id(id)?;
        let products = self.products.read().map_err(|_| internal())?;
        Ok(products.get(&id).cloned())
    }

    fn product_page(&self, query: PageQuery) -> Result<Option<Page<Product>>, ApiError> {
        let products = self.products.read().map_err(|_| internal())?;
        Ok(Some(page_of(&products, query)))
    }

    fn rename_user(&self, id: &str, name: String) -> Result<Option<User>, ApiError> {
        let id = parse_id(id)?;
        let mut users = self.users.write().map_err(|_| internal())?;
        Ok(users.get_mut(&id).map(|user| {
            user.name = name;
            user.clone()
        }))
    }
}

fn page_of<T: Clone>(rows: &BTreeMap<u64, T>, query: PageQuery) -> Page<T> {
    let items = rows
        .values()
        .skip(query.offset() as usize)
        .take(query.limit() as usize)
        .cloned()
        .collect();
    Page::new(items, query, rows.len() as u64)
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid id {raw:?}")))
}

fn internal() -> ApiError {
    ApiError::Internal("catalog unavailable".to_owned())
}

#[derive(Deserialize)]
struct Rename {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rttp_cache=debug")),
        )
        .init();

    let config = CacheConfig::from_env()?;
    let keys = config.key_builder();
    let store = Arc::new(RedisStore::connect(config).await?);
    let client = CacheClient::new(store.clone());
    let metrics = Arc::new(CacheMetrics::new(client.clone()));

    let ttls = TtlTable::standard();
    let entity_ttl = |resource: &str| ttls.entity(resource).unwrap_or(TtlTier::Moderate.ttl());
    let list_ttl = |resource: &str| ttls.list(resource).unwrap_or(TtlTier::Listing.ttl());
    let policies = PolicyTable::new()
        .bind("users.find_one", CachePolicy::entity(entity_ttl("users"), "users", "id"))
        .bind("users.find_all", CachePolicy::list(list_ttl("users"), "users"))
        .bind("products.find_one", CachePolicy::entity(entity_ttl("products"), "products", "id"))
        .bind("products.find_all", CachePolicy::list(list_ttl("products"), "products"));

    let cache = Arc::new(CacheInterceptor::new(
        client,
        keys,
        Arc::new(policies),
        Arc::clone(&metrics),
    ));
    let catalog = Arc::new(Catalog::seeded());

    let mut router = Router::new();

    let db = Arc::clone(&catalog);
    router.get(
        "/users",
        cache.json("users.find_all", move |ctx: Context| {
            let db = Arc::clone(&db);
            async move { db.user_page(PageQuery::from_query(ctx.query())) }
        }),
    );

    let db = Arc::clone(&catalog);
    router.get(
        "/users/:id",
        cache.json("users.find_one", move |ctx: Context| {
            let db = Arc::clone(&db);
            async move { db.user(ctx.params().get("id").unwrap_or_default()) }
        }),
    );

    // Writes go straight to the catalog; cached reads refresh when their TTL runs out.
    let db = Arc::clone(&catalog);
    router.put("/users/:id", move |ctx: Context| {
        let db = Arc::clone(&db);
        async move {
            let rename: Rename = match ctx.json() {
                Ok(body) => body,
                Err(e) => return ApiError::BadRequest(e.to_string()).into_response(),
            };
            match db.rename_user(ctx.params().get("id").unwrap_or_default(), rename.name) {
                Ok(Some(user)) => Response::json(StatusCode::Ok, &user),
                Ok(None) => ApiError::not_found("user not found").into_response(),
                Err(e) => e.into_response(),
            }
        }
    });

    let db = Arc::clone(&catalog);
    router.get(
        "/products",
        cache.json("products.find_all", move |ctx: Context| {
            let db = Arc::clone(&db);
            async move { db.product_page(PageQuery::from_query(ctx.query())) }
        }),
    );

    let db = Arc::clone(&catalog);
    router.get(
        "/products/:id",
        cache.json("products.find_one", move |ctx: Context| {
            let db = Arc::clone(&db);
            async move { db.product(ctx.params().get("id").unwrap_or_default()) }
        }),
    );

    metrics.routes(&mut router, "/cache/metrics");

    let pipeline = Pipeline::new(router).with(Arc::new(LoggerMiddleware));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
    let server = Server::bind(&addr).await?;
    tracing::info!(%addr, "cached api listening");

    server
        .run_until(pipeline, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.close();
    tracing::info!("shut down");
    Ok(())
}
