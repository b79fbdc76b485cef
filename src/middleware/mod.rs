//! Middleware pipeline — code that runs around the matched handler.
//!
//! Middleware compose like an onion: the chain is built by wrapping the
//! handler with each middleware in **reverse** registration order, so the
//! first-registered middleware ends up outermost and runs first (and sees the
//! response last).
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — the rest of the chain; call [`Next::run`] to continue.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_fn`] — build a [`MiddlewareHandler`].
//! - [`compose`] — wrap a handler with a middleware list.
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::router::{Handler, ResponseFuture};
use crate::{Response, context::Context};

/// The remainder of the chain below the current middleware.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once. Dropping it without calling `run` short-circuits the
/// chain.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use trierouter::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    inner: Handler,
}

impl Next {
    /// Wrap `inner` — the handler, or the next middleware already composed
    /// around it.
    pub fn new(inner: Handler) -> Self {
        Self { inner }
    }

    /// Invoke the rest of the chain and return its response.
    pub async fn run(self, ctx: Context) -> Response {
        (self.inner)(ctx).await
    }
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// The core middleware trait.
///
/// Implementors receive the request [`Context`] and the [`Next`] link. They may
/// pass the request through, short-circuit with their own [`Response`], or
/// decorate the downstream response.
///
/// The returned future must be `Send + 'static`: clone whatever state from
/// `&self` the future needs before moving it into the `async` block.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Convert a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trierouter::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Build a [`MiddlewareHandler`] from an async closure.
///
/// ```
/// use trierouter::middleware::from_fn;
///
/// let add_header = from_fn(|ctx, next| async move {
///     let mut response = next.run(ctx).await;
///     response.add_header("X-Served-By", "trierouter");
///     response
/// });
/// # drop(add_header);
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, next: Next| -> ResponseFuture { Box::pin(f(ctx, next)) })
}

/// Wrap `endpoint` with `middlewares`, outermost first.
///
/// The list is applied in reverse, so `middlewares[0]` is the first thing to
/// run when the returned handler is invoked and `endpoint` the last.
pub fn compose(middlewares: &[MiddlewareHandler], endpoint: Handler) -> Handler {
    middlewares.iter().rev().fold(endpoint, |inner, middleware| {
        let middleware = Arc::clone(middleware);
        let wrapped: Handler =
            Arc::new(move |ctx: Context| middleware(ctx, Next::new(Arc::clone(&inner))));
        wrapped
    })
}

/// Built-in middleware that logs one line per request.
///
/// Emits a `tracing::info!` record after the downstream chain completes with
/// the method, path, matched pattern, status and elapsed time. It never
/// short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_owned();
            let path = ctx.request().path().to_owned();
            let pattern = ctx
                .route()
                .map(|route| route.pattern().to_owned())
                .unwrap_or_default();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                %pattern,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request served"
            );

            response
        })
    }
}
