//! Request routing — map a request path to a registered handler and run the
//! middleware chain around it.
//!
//! Patterns are `/`-separated segments. A segment written `{name}` binds any
//! single path segment to `name`; any other segment is a literal matched
//! case-insensitively.
//!
//! | Pattern              | Example match        | Bound params   |
//! |----------------------|----------------------|----------------|
//! | `/users`             | `/Users/`            | *(none)*       |
//! | `/users/{id}`        | `/users/42`          | `id → "42"`    |
//! | `/a/{id}`            | `/A/ABC`             | `id → "abc"`   |
//!
//! Duplicate and trailing slashes are ignored, as is anything after `?`.
//! Parameter values are lowercased along with the rest of the path.
//!
//! ## Dispatch
//!
//! [`Router::serve`] matches the path in the trie, then scans the routes at
//! the matched node in registration order and picks the first one that has a
//! handler and accepts the request method. No node, or only handler-less
//! routes, is a `404`; handlers that all reject the method is a `405`.
//!
//! ## Sub-routers
//!
//! [`Router::mount`] returns a [`SubRouter`] anchored at a prefix node of the
//! same tree. Its patterns are relative to the prefix and its middleware runs
//! inside the parent's, so execution order follows registration order from
//! the root down.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::context::{Context, Parameters};
use crate::middleware::{self, Middleware, MiddlewareHandler, Next};
use crate::{Method, Request, Response, StatusCode};

pub mod route;
pub mod tree;

pub use route::{Route, RouteDescriptor, RouteMeta, RouteMut, RouteOption};
pub use tree::{Node, NodeId, SegmentKind, Tree};

/// Boxed response future returned by handlers and middleware.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, heap-allocated async handler that turns a [`Context`] into a
/// [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so the composed chain can be
/// rebuilt per request without copying closures. Build one with
/// [`handler_fn`], or register a closure directly with [`Router::handle_fn`].
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Erase an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context| -> ResponseFuture { Box::pin(f(ctx)) })
}

/// Errors produced by registration and resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The pattern is empty or does not start with `/`. Nothing was registered.
    #[error("invalid route pattern {pattern:?}: must be non-empty and start with '/'")]
    InvalidPattern { pattern: String },

    /// No node matched the path, or the matched node has no handler.
    #[error("no route matches {path}")]
    NotFound { path: String },

    /// Handlers exist at the path but none accepts the method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },
}

impl RouterError {
    /// The status code a dispatch failure is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPattern { .. } => StatusCode::InternalServerError,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::MethodNotAllowed { .. } => StatusCode::MethodNotAllowed,
        }
    }
}

/// Outcome of a successful [`Router::resolve`].
pub struct Resolved<'r> {
    route: &'r Route,
    handler: &'r Handler,
    params: Parameters,
}

impl std::fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("route", self.route)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl<'r> Resolved<'r> {
    pub fn route(&self) -> &'r Route {
        self.route
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn into_params(self) -> Parameters {
        self.params
    }
}

// One router's middleware list, anchored at the node it was mounted on.
struct Scope {
    node: NodeId,
    middlewares: Vec<MiddlewareHandler>,
}

const ROOT_SCOPE: usize = 0;

/// Trie-based HTTP request router.
///
/// Registration takes `&mut self`; dispatch takes `&self`. Build the router
/// first, then share it (e.g. as `Arc<Router>`) with the tasks serving
/// requests.
///
/// # Examples
///
/// ```
/// use trierouter::{Method, Request, Response, Router, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut router = Router::new();
/// router
///     .handle_fn("/users/{id}", |ctx| async move {
///         let id = ctx.param("id").unwrap_or_default().to_owned();
///         Response::new(StatusCode::Ok).body(id)
///     })
///     .unwrap()
///     .allow_method(Method::Get);
///
/// let response = router.serve(Request::new(Method::Get, "/Users/ABC")).await;
/// assert_eq!(response.body_str(), Some("abc"));
///
/// let response = router.serve(Request::new(Method::Post, "/users/1")).await;
/// assert_eq!(response.status(), StatusCode::MethodNotAllowed);
/// # }
/// ```
pub struct Router {
    tree: Tree,
    scopes: Vec<Scope>,
    // Mount node → index into `scopes`. The root is always present.
    mounts: HashMap<NodeId, usize>,
    not_found: Handler,
    method_not_allowed: Handler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with an empty tree and no middleware.
    pub fn new() -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Self {
            tree,
            scopes: vec![Scope {
                node: root,
                middlewares: Vec::new(),
            }],
            mounts: HashMap::from([(root, ROOT_SCOPE)]),
            not_found: default_not_found(),
            method_not_allowed: default_method_not_allowed(),
        }
    }

    /// Register `handler` at `pattern`.
    ///
    /// Registering the same pattern again adds another route to the same
    /// node; dispatch then picks between them by method, first registered
    /// first. Use the returned [`RouteMut`] to restrict methods or attach an
    /// authorization policy.
    ///
    /// # Errors
    ///
    /// [`RouterError::InvalidPattern`] if `pattern` is empty or relative.
    pub fn handle(&mut self, pattern: &str, handler: Handler) -> Result<RouteMut<'_>, RouterError> {
        self.register(ROOT_SCOPE, pattern, Some(handler))
            .map(RouteMut::new)
    }

    /// Register an async closure at `pattern`. See [`handle`](Self::handle).
    pub fn handle_fn<F, Fut>(&mut self, pattern: &str, f: F) -> Result<RouteMut<'_>, RouterError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(pattern, handler_fn(f))
    }

    /// Register a route without a handler.
    ///
    /// The route carries options but is never selected by dispatch; a path
    /// whose node holds only such routes answers `404`.
    pub fn path_prefix(&mut self, pattern: &str) -> Result<RouteMut<'_>, RouterError> {
        self.register(ROOT_SCOPE, pattern, None).map(RouteMut::new)
    }

    /// Append a middleware to this router's list.
    pub fn use_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.push_middlewares(ROOT_SCOPE, [middleware::from_middleware(Arc::new(middleware))]);
        self
    }

    /// Append an async closure as middleware.
    pub fn use_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.push_middlewares(ROOT_SCOPE, [middleware::from_fn(f)]);
        self
    }

    /// Append several middleware at once, keeping their order.
    pub fn use_all(&mut self, middlewares: impl IntoIterator<Item = MiddlewareHandler>) -> &mut Self {
        self.push_middlewares(ROOT_SCOPE, middlewares);
        self
    }

    /// This router's own middleware, in registration order.
    pub fn middlewares(&self) -> &[MiddlewareHandler] {
        &self.scopes[ROOT_SCOPE].middlewares
    }

    /// Mount a sub-router at `prefix`.
    ///
    /// The prefix node is created if needed but gets no route. Mounting the
    /// same prefix twice yields the same sub-router; mounting `/` yields the
    /// root router's own scope.
    ///
    /// # Errors
    ///
    /// [`RouterError::InvalidPattern`] if `prefix` is empty or relative.
    pub fn mount(&mut self, prefix: &str) -> Result<SubRouter<'_>, RouterError> {
        let scope = self.mount_at(ROOT_SCOPE, prefix)?;
        Ok(SubRouter {
            router: self,
            scope,
        })
    }

    /// Replace the responder used when no route matches.
    ///
    /// It receives a [`Context`] with no route bound and runs outside the
    /// middleware chain.
    pub fn not_found(&mut self, handler: Handler) -> &mut Self {
        self.not_found = handler;
        self
    }

    /// Replace the responder used when the path matches but the method does
    /// not. An `Allow` header is added to its response unless it set one.
    pub fn method_not_allowed(&mut self, handler: Handler) -> &mut Self {
        self.method_not_allowed = handler;
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Every registered route, depth-first in tree order and, within a node,
    /// in registration order.
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.tree
            .walk()
            .into_iter()
            .flat_map(|id| self.tree.node(id).routes().iter().map(RouteDescriptor::from))
            .collect()
    }

    /// [`routes`](Self::routes) rendered as pretty-printed JSON.
    pub fn routes_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.routes())
    }

    /// Select the route for `method` and `path` without running anything.
    ///
    /// # Errors
    ///
    /// - [`RouterError::NotFound`] — no node matches, or none of its routes
    ///   has a handler.
    /// - [`RouterError::MethodNotAllowed`] — handlers exist but none accepts
    ///   `method`; `allowed` lists the methods they declare.
    pub fn resolve<'r>(&'r self, method: &Method, path: &str) -> Result<Resolved<'r>, RouterError> {
        let mut params = Parameters::new();
        let Some(node) = self.tree.find(self.tree.root(), path, &mut params) else {
            debug!(%method, path, "no node matches path");
            return Err(RouterError::NotFound {
                path: path.to_owned(),
            });
        };

        let mut has_handler = false;
        for route in self.tree.node(node).routes() {
            let Some(handler) = route.handler() else {
                continue;
            };
            has_handler = true;

            if route.is_method_allowed(method) {
                debug!(%method, path, pattern = route.meta().pattern(), "route matched");
                return Ok(Resolved {
                    route,
                    handler,
                    params,
                });
            }
        }

        if !has_handler {
            debug!(%method, path, "matched node has no handler");
            return Err(RouterError::NotFound {
                path: path.to_owned(),
            });
        }

        let mut allowed: Vec<Method> = Vec::new();
        for route in self.tree.node(node).routes().iter().filter(|r| r.has_handler()) {
            for m in route.meta().methods() {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }
        debug!(%method, path, "method not allowed");
        Err(RouterError::MethodNotAllowed {
            method: method.clone(),
            path: path.to_owned(),
            allowed,
        })
    }

    /// Dispatch `request` and return the response.
    ///
    /// On a match the route's handler is wrapped with the middleware of every
    /// router mounted on the way from the root to the matched node, root
    /// outermost, and invoked with a [`Context`] carrying the route metadata,
    /// bound parameters and decoded query. Otherwise the 404 or 405 responder
    /// answers directly.
    pub async fn serve(&self, request: Request) -> Response {
        match self.resolve(request.method(), request.path()) {
            Ok(resolved) => {
                let node = resolved.route.meta().node();
                let chain = middleware::compose(
                    &self.middleware_chain(node),
                    Arc::clone(resolved.handler),
                );
                let route = resolved.route.shared_meta();
                let ctx = Context::for_route(request, route, resolved.into_params());
                chain(ctx).await
            }
            Err(RouterError::MethodNotAllowed { allowed, .. }) => {
                let mut response = (self.method_not_allowed)(Context::new(request)).await;
                if !allowed.is_empty() && !response.headers().contains("allow") {
                    let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                    response.add_header("Allow", names.join(", "));
                }
                response
            }
            Err(_) => (self.not_found)(Context::new(request)).await,
        }
    }

    /// Middleware that applies to routes at `node`: each mounted router from
    /// the root down to `node`, in registration order within each.
    fn middleware_chain(&self, node: NodeId) -> Vec<MiddlewareHandler> {
        let mut scopes: Vec<usize> = self
            .tree
            .ancestors(node)
            .filter_map(|id| self.mounts.get(&id).copied())
            .collect();
        scopes.reverse();

        scopes
            .into_iter()
            .flat_map(|scope| self.scopes[scope].middlewares.iter().cloned())
            .collect()
    }

    fn register(
        &mut self,
        scope: usize,
        pattern: &str,
        handler: Option<Handler>,
    ) -> Result<&mut Route, RouterError> {
        let base = self.scopes[scope].node;
        let node = self.tree.insert(base, pattern).inspect_err(|err| {
            warn!(error = %err, "route registration rejected");
        })?;

        let full = self.tree.pattern_of(node);
        trace!(pattern = %full, handler = handler.is_some(), "route registered");
        Ok(self
            .tree
            .node_mut(node)
            .push_route(Route::new(node, full, handler)))
    }

    fn mount_at(&mut self, scope: usize, prefix: &str) -> Result<usize, RouterError> {
        let base = self.scopes[scope].node;
        let node = self.tree.insert(base, prefix).inspect_err(|err| {
            warn!(error = %err, "mount rejected");
        })?;

        if let Some(&existing) = self.mounts.get(&node) {
            return Ok(existing);
        }

        let id = self.scopes.len();
        self.scopes.push(Scope {
            node,
            middlewares: Vec::new(),
        });
        self.mounts.insert(node, id);
        trace!(prefix = %self.tree.pattern_of(node), "sub-router mounted");
        Ok(id)
    }

    fn push_middlewares(
        &mut self,
        scope: usize,
        middlewares: impl IntoIterator<Item = MiddlewareHandler>,
    ) {
        let list = &mut self.scopes[scope].middlewares;
        let before = list.len();
        list.extend(middlewares);
        trace!(added = list.len() - before, total = list.len(), "middleware registered");
    }
}

/// A router scoped to a prefix of its parent's tree.
///
/// Borrowed from the parent for the duration of registration. Everything
/// registered here is visible to the parent's dispatch.
///
/// # Examples
///
/// ```
/// use trierouter::{Method, Request, Response, Router, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut router = Router::new();
/// {
///     let mut api = router.mount("/api").unwrap();
///     api.use_fn(|ctx, next| async move {
///         let mut response = next.run(ctx).await;
///         response.add_header("X-Api", "1");
///         response
///     });
///     api.handle_fn("/health", |_ctx| async { Response::new(StatusCode::NoContent) })
///         .unwrap();
/// }
///
/// let response = router.serve(Request::new(Method::Get, "/api/health")).await;
/// assert_eq!(response.status(), StatusCode::NoContent);
/// assert_eq!(response.headers().get("x-api"), Some("1"));
/// # }
/// ```
pub struct SubRouter<'a> {
    router: &'a mut Router,
    scope: usize,
}

impl SubRouter<'_> {
    /// The node this sub-router is anchored at.
    pub fn node(&self) -> NodeId {
        self.router.scopes[self.scope].node
    }

    /// Normalized prefix of this sub-router, from the root.
    pub fn prefix(&self) -> String {
        self.router.tree.pattern_of(self.node())
    }

    /// Register `handler` at `pattern`, relative to the prefix.
    pub fn handle(&mut self, pattern: &str, handler: Handler) -> Result<RouteMut<'_>, RouterError> {
        self.router
            .register(self.scope, pattern, Some(handler))
            .map(RouteMut::new)
    }

    pub fn handle_fn<F, Fut>(&mut self, pattern: &str, f: F) -> Result<RouteMut<'_>, RouterError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handle(pattern, handler_fn(f))
    }

    pub fn path_prefix(&mut self, pattern: &str) -> Result<RouteMut<'_>, RouterError> {
        self.router
            .register(self.scope, pattern, None)
            .map(RouteMut::new)
    }

    pub fn use_middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.router
            .push_middlewares(self.scope, [middleware::from_middleware(Arc::new(middleware))]);
        self
    }

    pub fn use_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.router
            .push_middlewares(self.scope, [middleware::from_fn(f)]);
        self
    }

    pub fn use_all(&mut self, middlewares: impl IntoIterator<Item = MiddlewareHandler>) -> &mut Self {
        self.router.push_middlewares(self.scope, middlewares);
        self
    }

    pub fn middlewares(&self) -> &[MiddlewareHandler] {
        &self.router.scopes[self.scope].middlewares
    }

    /// Mount a nested sub-router at `prefix`, relative to this one.
    pub fn mount(&mut self, prefix: &str) -> Result<SubRouter<'_>, RouterError> {
        let scope = self.router.mount_at(self.scope, prefix)?;
        Ok(SubRouter {
            router: &mut *self.router,
            scope,
        })
    }
}

fn default_not_found() -> Handler {
    handler_fn(|_ctx| async {
        Response::new(StatusCode::NotFound)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body("404 page not found")
    })
}

fn default_method_not_allowed() -> Handler {
    handler_fn(|_ctx| async {
        Response::new(StatusCode::MethodNotAllowed)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body("405 method not allowed")
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::middleware::from_fn;

    type Log = Arc<Mutex<Vec<String>>>;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn ok() -> Handler {
        handler_fn(|_ctx| async { Response::new(StatusCode::Ok) })
    }

    fn status(code: StatusCode) -> Handler {
        handler_fn(move |_ctx| async move { Response::new(code) })
    }

    fn recording(log: &Log, name: &'static str) -> MiddlewareHandler {
        let log = Arc::clone(log);
        from_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name.to_owned());
                next.run(ctx).await
            }
        })
    }

    fn recording_handler(log: &Log, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        handler_fn(move |_ctx| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name.to_owned());
                Response::new(StatusCode::Ok)
            }
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    // ── registration ──────────────────────────────────────────────────────────

    #[test]
    fn router_starts_with_bare_root() {
        let router = Router::default();
        assert_eq!(router.tree().len(), 1);
        assert!(router.middlewares().is_empty());
        assert!(router.routes().is_empty());
    }

    #[test]
    fn handle_rejects_invalid_patterns_without_mutation() {
        let mut router = Router::new();
        for pattern in ["", "api"] {
            let err = router.handle(pattern, ok()).unwrap_err();
            assert_eq!(
                err,
                RouterError::InvalidPattern {
                    pattern: pattern.to_owned()
                }
            );
        }
        assert_eq!(router.tree().len(), 1);
        assert!(router.routes().is_empty());
    }

    #[test]
    fn handle_attaches_route_to_node() {
        let mut router = Router::new();
        let node = router
            .handle("/api", ok())
            .unwrap()
            .allow_method(Method::Get)
            .meta()
            .node();

        let routes = router.tree().node(node).routes();
        assert_eq!(routes.len(), 1);
        assert!(routes[0].has_handler());
        assert_eq!(routes[0].meta().node(), node);
        assert_eq!(routes[0].meta().pattern(), "/api");
    }

    #[test]
    fn repeated_pattern_accumulates_routes_on_one_node() {
        let mut router = Router::new();
        let first = router.handle("/api", ok()).unwrap().meta().node();
        let second = router.handle("/API/", ok()).unwrap().meta().node();
        assert_eq!(first, second);
        assert_eq!(router.tree().node(first).routes().len(), 2);
        assert_eq!(router.tree().len(), 2);
    }

    #[test]
    fn options_are_applied_in_order() {
        let mut router = Router::new();
        let route = router.handle("/admin", ok()).unwrap().options([
            RouteOption::allow(Method::Get),
            RouteOption::AllowMethods(vec![Method::Post, Method::Get]),
            RouteOption::authorize("admin"),
        ]);
        assert_eq!(route.meta().methods(), [Method::Get, Method::Post]);
        assert_eq!(route.meta().authorization_policy(), Some("admin"));
    }

    #[test]
    fn routes_lists_every_registration() {
        let mut router = Router::new();
        router.handle("/b", ok()).unwrap().allow_method(Method::Get);
        router.path_prefix("/a").unwrap().authorize("p");
        router.handle("/b/{id}", ok()).unwrap();

        let routes = router.routes();
        let patterns: Vec<_> = routes.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["/b", "/b/{id}", "/a"]);
        assert_eq!(routes[0].methods, vec![Method::Get]);
        assert!(!routes[2].has_handler);
        assert_eq!(routes[2].policy.as_deref(), Some("p"));

        let json: serde_json::Value = serde_json::from_str(&router.routes_json().unwrap()).unwrap();
        assert_eq!(json[0]["methods"][0], "GET");
        assert_eq!(json[2]["policy"], "p");
    }

    // ── resolution ────────────────────────────────────────────────────────────

    #[test]
    fn resolve_reports_each_outcome() {
        let mut router = Router::new();
        router.handle("/api", ok()).unwrap().allow_method(Method::Get);
        router
            .handle("/api", ok())
            .unwrap()
            .allow_methods([Method::Put, Method::Get]);
        router.path_prefix("/prefix").unwrap();

        let resolved = router.resolve(&Method::Get, "/api").unwrap();
        assert_eq!(resolved.route().meta().methods(), [Method::Get]);

        let resolved = router.resolve(&Method::Put, "/api").unwrap();
        assert_eq!(resolved.route().meta().methods(), [Method::Put, Method::Get]);

        assert_eq!(
            router.resolve(&Method::Delete, "/api").unwrap_err(),
            RouterError::MethodNotAllowed {
                method: Method::Delete,
                path: "/api".to_owned(),
                allowed: vec![Method::Get, Method::Put],
            }
        );
        assert!(matches!(
            router.resolve(&Method::Get, "/unknown"),
            Err(RouterError::NotFound { .. })
        ));
        assert!(matches!(
            router.resolve(&Method::Get, "/prefix"),
            Err(RouterError::NotFound { .. })
        ));
    }

    #[test]
    fn resolve_skips_handlerless_routes() {
        let mut router = Router::new();
        router.path_prefix("/docs").unwrap().allow_method(Method::Get);
        router.handle("/docs", status(StatusCode::Accepted)).unwrap();
        let resolved = router.resolve(&Method::Get, "/docs").unwrap();
        assert!(resolved.route().has_handler());
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            RouterError::NotFound { path: "/".into() }.status(),
            StatusCode::NotFound
        );
        let err = RouterError::MethodNotAllowed {
            method: Method::Delete,
            path: "/api".into(),
            allowed: vec![],
        };
        assert_eq!(err.status(), StatusCode::MethodNotAllowed);
        assert_eq!(err.to_string(), "method DELETE not allowed for /api");
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        let res = router.serve(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.body_str(), Some("404 page not found"));
    }

    #[tokio::test]
    async fn dispatch_selects_route_by_method() {
        let mut router = Router::new();
        router
            .handle("/api", status(StatusCode::Ok))
            .unwrap()
            .allow_method(Method::Get);
        router
            .handle("/api", status(StatusCode::Created))
            .unwrap()
            .allow_method(Method::Put);

        let get = router.serve(make_request("GET", "/api")).await;
        assert_eq!(get.status(), StatusCode::Ok);

        let put = router.serve(make_request("PUT", "/api")).await;
        assert_eq!(put.status(), StatusCode::Created);

        let delete = router.serve(make_request("DELETE", "/api")).await;
        assert_eq!(delete.status(), StatusCode::MethodNotAllowed);
        assert_eq!(delete.body_str(), Some("405 method not allowed"));
        assert_eq!(delete.headers().get("allow"), Some("GET, PUT"));

        let unknown = router.serve(make_request("GET", "/unknown")).await;
        assert_eq!(unknown.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn empty_method_set_accepts_every_method() {
        let mut router = Router::new();
        router.handle("/any", ok()).unwrap();
        for method in ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "PURGE"] {
            let res = router.serve(make_request(method, "/any")).await;
            assert_eq!(res.status(), StatusCode::Ok, "{method}");
        }
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.handle("/path", status(StatusCode::Ok)).unwrap();
        router.handle("/path", status(StatusCode::Accepted)).unwrap();
        let res = router.serve(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn handlerless_node_is_not_found() {
        let mut router = Router::new();
        router.path_prefix("/static").unwrap();
        router.handle("/static/app.js", ok()).unwrap();
        let res = router.serve(make_request("GET", "/static")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn slashes_and_case_are_normalized() {
        let mut router = Router::new();
        router.handle("/api/v1", ok()).unwrap();
        for path in ["/api/v1", "/api//v1/", "/API/V1", "//api/v1?x=1"] {
            let res = router.serve(make_request("GET", path)).await;
            assert_eq!(res.status(), StatusCode::Ok, "{path}");
        }
    }

    #[tokio::test]
    async fn path_is_matched_percent_decoded() {
        let mut router = Router::new();
        router
            .handle_fn("/users/{name}", |ctx| async move {
                let name = ctx.param("name").unwrap_or_default().to_owned();
                Response::new(StatusCode::Ok).body(name)
            })
            .unwrap();
        router.handle("/caf\u{e9}", status(StatusCode::Accepted)).unwrap();

        let res = router.serve(make_request("GET", "/users/John%20Doe")).await;
        assert_eq!(res.body_str(), Some("john doe"));

        let res = router.serve(make_request("GET", "/CAF%C3%A9")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
    }

    #[tokio::test]
    async fn absolute_form_target_dispatches_on_its_path() {
        let mut router = Router::new();
        router.handle("/a/{id}", ok()).unwrap();
        let res = router
            .serve(make_request("GET", "http://example.com/a/1?x=2"))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[test]
    fn resolution_outcomes_are_debuggable() {
        let mut router = Router::new();
        router.handle("/a/{id}", ok()).unwrap().allow_method(Method::Get);
        let resolved = router.resolve(&Method::Get, "/a/1").unwrap();
        let rendered = format!("{resolved:?}");
        assert!(rendered.starts_with("Resolved"));
        assert!(rendered.contains("/a/{id}"));

        let route = router.handle("/b", ok()).unwrap();
        assert!(format!("{route:?}").contains("/b"));
    }

    #[tokio::test]
    async fn context_carries_route_params_and_query() {
        let mut router = Router::new();
        router
            .handle_fn("/a/{id}", |ctx| async move {
                let route = ctx.route().expect("route is published");
                let body = format!(
                    "{}|{}|{}|{:?}|{}",
                    route.pattern(),
                    route.authorization_policy().unwrap_or("-"),
                    ctx.param("id").unwrap_or("-"),
                    ctx.query_values("tag"),
                    ctx.query_value("missing").unwrap_or("none"),
                );
                Response::new(StatusCode::Ok).body(body)
            })
            .unwrap()
            .authorize("reader");

        let res = router
            .serve(make_request("GET", "/A/ABC?tag=x&tag=y%20z"))
            .await;
        assert_eq!(
            res.body_str(),
            Some(r#"/a/{id}|reader|abc|["x", "y z"]|none"#)
        );
    }

    #[tokio::test]
    async fn custom_fallback_responders() {
        let mut router = Router::new();
        router.handle("/only-get", ok()).unwrap().allow_method(Method::Get);
        router
            .not_found(handler_fn(|ctx| async move {
                let path = ctx.request().path().to_owned();
                Response::new(StatusCode::NotFound).body(format!("nothing at {path}"))
            }))
            .method_not_allowed(handler_fn(|_ctx| async {
                Response::new(StatusCode::MethodNotAllowed).header("Allow", "custom")
            }));

        let res = router.serve(make_request("GET", "/missing")).await;
        assert_eq!(res.body_str(), Some("nothing at /missing"));

        let res = router.serve(make_request("POST", "/only-get")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        let allow: Vec<_> = res.headers().get_all("allow").collect();
        assert_eq!(allow, vec!["custom"]);
    }

    // ── middleware ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn middleware_runs_in_registration_order() {
        let log = Log::default();
        let mut router = Router::new();
        router.handle("/api", recording_handler(&log, "H")).unwrap();
        router.use_all([recording(&log, "A"), recording(&log, "B")]);
        assert_eq!(router.middlewares().len(), 2);

        for _ in 0..2 {
            let res = router.serve(make_request("GET", "/api")).await;
            assert_eq!(res.status(), StatusCode::Ok);
        }
        assert_eq!(entries(&log), vec!["A", "B", "H", "A", "B", "H"]);
    }

    #[tokio::test]
    async fn middleware_is_skipped_for_404_and_405() {
        let log = Log::default();
        let mut router = Router::new();
        router.use_all([recording(&log, "A")]);
        router.handle("/api", ok()).unwrap().allow_method(Method::Get);

        router.serve(make_request("GET", "/nope")).await;
        router.serve(make_request("POST", "/api")).await;
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn middleware_registered_by_trait_and_closure() {
        struct Stamp;
        impl Middleware for Stamp {
            fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
                Box::pin(async move {
                    let mut res = next.run(ctx).await;
                    res.add_header("X-Stamp", "trait");
                    res
                })
            }
        }

        let mut router = Router::new();
        router.handle("/", ok()).unwrap();
        router.use_middleware(Stamp).use_fn(|ctx, next| async move {
            let mut res = next.run(ctx).await;
            res.add_header("X-Stamp", "closure");
            res
        });

        let res = router.serve(make_request("GET", "/")).await;
        let stamps: Vec<_> = res.headers().get_all("x-stamp").collect();
        // Inner middleware decorates first.
        assert_eq!(stamps, vec!["closure", "trait"]);
    }

    // ── sub-routers ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sub_router_registers_relative_to_prefix() {
        let mut router = Router::new();
        {
            let mut api = router.mount("/api").unwrap();
            assert_eq!(api.prefix(), "/api");
            api.handle("/users/{id}", ok()).unwrap();
        }
        assert_eq!(router.routes()[0].pattern, "/api/users/{id}");

        let res = router.serve(make_request("GET", "/api/users/7")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = router.serve(make_request("GET", "/users/7")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn sub_router_middleware_runs_inside_parent() {
        let log = Log::default();
        let mut router = Router::new();
        router.use_all([recording(&log, "root-1")]);
        {
            let mut api = router.mount("/api").unwrap();
            api.use_all([recording(&log, "api-1"), recording(&log, "api-2")]);
            api.handle("/users", recording_handler(&log, "H")).unwrap();
        }
        router.use_all([recording(&log, "root-2")]);

        router.serve(make_request("GET", "/api/users")).await;
        assert_eq!(
            entries(&log),
            vec!["root-1", "root-2", "api-1", "api-2", "H"]
        );
    }

    #[tokio::test]
    async fn nested_mounts_compose_root_to_leaf() {
        let log = Log::default();
        let mut router = Router::new();
        router.use_all([recording(&log, "root")]);
        {
            let mut api = router.mount("/api").unwrap();
            api.use_all([recording(&log, "api")]);
            let mut v1 = api.mount("/v1").unwrap();
            assert_eq!(v1.prefix(), "/api/v1");
            v1.use_all([recording(&log, "v1")]);
            v1.handle("/items", recording_handler(&log, "H")).unwrap();
        }

        router.serve(make_request("GET", "/api/v1/items")).await;
        assert_eq!(entries(&log), vec!["root", "api", "v1", "H"]);
    }

    #[tokio::test]
    async fn sub_router_middleware_covers_routes_registered_on_parent() {
        let log = Log::default();
        let mut router = Router::new();
        router
            .mount("/api")
            .unwrap()
            .use_all([recording(&log, "api")]);
        router.handle("/api/status", recording_handler(&log, "H")).unwrap();
        router.handle("/other", recording_handler(&log, "other")).unwrap();

        router.serve(make_request("GET", "/api/status")).await;
        router.serve(make_request("GET", "/other")).await;
        assert_eq!(entries(&log), vec!["api", "H", "other"]);
    }

    #[tokio::test]
    async fn route_at_mount_point_gets_sub_router_middleware() {
        let log = Log::default();
        let mut router = Router::new();
        {
            let mut api = router.mount("/api").unwrap();
            api.use_all([recording(&log, "api")]);
            api.handle("/", recording_handler(&log, "H")).unwrap();
        }
        router.serve(make_request("GET", "/api")).await;
        assert_eq!(entries(&log), vec!["api", "H"]);
    }

    #[tokio::test]
    async fn sibling_mounts_do_not_share_middleware() {
        let log = Log::default();
        let mut router = Router::new();
        {
            let mut a = router.mount("/a").unwrap();
            a.use_all([recording(&log, "a")]);
            a.handle("/x", recording_handler(&log, "Ha")).unwrap();
        }
        {
            let mut b = router.mount("/b").unwrap();
            b.use_all([recording(&log, "b")]);
            b.handle("/x", recording_handler(&log, "Hb")).unwrap();
        }

        router.serve(make_request("GET", "/b/x")).await;
        assert_eq!(entries(&log), vec!["b", "Hb"]);
    }

    #[test]
    fn mounting_twice_reuses_the_sub_router() {
        let mut router = Router::new();
        router
            .mount("/api")
            .unwrap()
            .use_all([from_fn(|ctx, next| next.run(ctx))]);
        let again = router.mount("/API/").unwrap();
        assert_eq!(again.middlewares().len(), 1);
    }

    #[test]
    fn mounting_root_shares_root_middleware() {
        let mut router = Router::new();
        router
            .mount("/")
            .unwrap()
            .use_all([from_fn(|ctx, next| next.run(ctx))]);
        assert_eq!(router.middlewares().len(), 1);
    }

    #[test]
    fn mount_rejects_invalid_prefix() {
        let mut router = Router::new();
        assert!(matches!(
            router.mount("api"),
            Err(RouterError::InvalidPattern { .. })
        ));
        assert_eq!(router.tree().len(), 1);
    }

    #[test]
    fn mount_creates_prefix_without_route() {
        let mut router = Router::new();
        let node = router.mount("/api").unwrap().node();
        assert!(router.tree().node(node).routes().is_empty());
    }

    // ── concurrency ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn frozen_router_serves_concurrently() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Router>();

        let mut router = Router::new();
        router.handle_fn("/echo/{word}", |ctx| async move {
            let word = ctx.param("word").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(word)
        })
        .unwrap();
        let router = Arc::new(router);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let res = router.serve(make_request("GET", &format!("/echo/W{i}"))).await;
                    (i, res.body_str().map(str::to_owned))
                })
            })
            .collect();

        for task in tasks {
            let (i, body) = task.await.unwrap();
            assert_eq!(body, Some(format!("w{i}")));
        }
    }
}
