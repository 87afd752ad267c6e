//! Middleware pipeline: composable before/after request handler logic.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`]: an ordered middleware stack terminating in a [`Router`].
//! - [`LoggerMiddleware`]: built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context, router::Router};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    fn new(middlewares: Arc<[MiddlewareHandler]>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without producing a response, a `500 Internal
    /// Server Error` is returned.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Ordered middleware stack with a router as the innermost layer.
///
/// Middleware run in the order they were added. The pipeline is cheap to clone
/// and is what a [`Server`](crate::Server) dispatches into.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_cache::{Router, middleware::{LoggerMiddleware, Pipeline}};
///
/// let pipeline = Pipeline::new(Router::new()).with(Arc::new(LoggerMiddleware));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    chain: Arc<[MiddlewareHandler]>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        let router = Arc::new(router);
        Self {
            middlewares: Vec::new(),
            chain: Self::assemble(&[], &router),
            router,
        }
    }

    /// Appends a middleware; it runs after every middleware added before it.
    #[must_use]
    pub fn with<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(middleware));
        self.chain = Self::assemble(&self.middlewares, &self.router);
        self
    }

    // Middleware stack plus a terminal layer that hands the request to the router.
    fn assemble(middlewares: &[MiddlewareHandler], router: &Arc<Router>) -> Arc<[MiddlewareHandler]> {
        let router = Arc::clone(router);
        let terminal: MiddlewareHandler = Arc::new(
            move |ctx: Context, _next: Next| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                let router = Arc::clone(&router);
                Box::pin(async move { router.route(ctx.into_request()).await })
            },
        );

        middlewares
            .iter()
            .cloned()
            .chain(std::iter::once(terminal))
            .collect()
    }

    /// Runs `request` through the middleware stack and the router.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.chain))
            .run(Context::new(request))
            .await
    }
}

/// Logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes.
/// The `X-Cache` header, when a cached handler set one, is logged alongside.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let status = response.status().as_u16();
            let cache = response.headers().get("x-cache").unwrap_or("-");
            tracing::info!(
                %method,
                %path,
                status,
                cache,
                elapsed = ?start.elapsed(),
                "request completed"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut res = next.run(ctx).await;
                let seen = res.headers().get("x-trail").unwrap_or("").to_owned();
                res.set_header("X-Trail", format!("{seen}{tag}"));
                res
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle(&self, _ctx: Context, _next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::ServiceUnavailable) })
        }
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok).body("pong") });
        router
    }

    #[tokio::test]
    async fn empty_pipeline_reaches_router() {
        let res = Pipeline::new(router())
            .handle(Request::new(Method::Get, "/ping"))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"pong");
    }

    #[tokio::test]
    async fn middleware_unwinds_in_reverse_order() {
        let pipeline = Pipeline::new(router())
            .with(Arc::new(Tag("a")))
            .with(Arc::new(Tag("b")))
            .with(Arc::new(LoggerMiddleware));
        let res = pipeline.handle(Request::new(Method::Get, "/ping")).await;
        assert_eq!(res.headers().get("x-trail"), Some("ba"));
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let pipeline = Pipeline::new(router()).with(Arc::new(ShortCircuit));
        let res = pipeline.handle(Request::new(Method::Get, "/ping")).await;
        assert_eq!(res.status(), StatusCode::ServiceUnavailable);
    }
}
