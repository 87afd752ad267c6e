//! # rttp_cache
//!
//! Cache-aside response caching on top of a from-scratch async HTTP/1.1 server.
//!
//! Read handlers are bound to a cache policy at startup. On each request the
//! [`CacheInterceptor`](cache::CacheInterceptor) derives a key from the route
//! and query parameters, serves a cached value when there is one, and otherwise
//! calls the handler and stores its result with a per-resource TTL. The cache
//! backend (Redis, or the in-process store) may go away at any time; requests
//! then fall back to calling the handler directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttp_cache::middleware::Pipeline;
//! use rttp_cache::router::Router;
//! use rttp_cache::server::Server;
//! use rttp_cache::{Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/", |_ctx| async { Response::new(StatusCode::Ok).body("Hello, World!") });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(Pipeline::new(router)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod pagination;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use router::Router;
pub use server::{Server, ServerError};
