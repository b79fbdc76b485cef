//! Routes — one (methods, handler, policy tag) registration on a trie node.

use std::sync::Arc;

use serde::Serialize;

use super::Handler;
use super::tree::NodeId;
use crate::Method;

/// The descriptive half of a route, shared with every request it serves.
///
/// Handlers and middleware read it through
/// [`Context::route`](crate::context::Context::route), e.g. to look up the
/// authorization-policy tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMeta {
    node: NodeId,
    pattern: String,
    methods: Vec<Method>,
    policy: String,
}

impl RouteMeta {
    pub(crate) fn new(node: NodeId, pattern: String) -> Self {
        Self {
            node,
            pattern,
            methods: Vec::new(),
            policy: String::new(),
        }
    }

    /// The trie node the route is attached to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Normalized pattern of the node, from the root (`/users/{id}`).
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Allowed methods in the order they were added. Empty means "any".
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn is_method_allowed(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// The authorization-policy tag, or `None` when the route is not protected.
    pub fn authorization_policy(&self) -> Option<&str> {
        (!self.policy.is_empty()).then_some(self.policy.as_str())
    }

    pub fn is_protected(&self) -> bool {
        !self.policy.is_empty()
    }

    fn allow_method(&mut self, method: Method) {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
    }

    fn authorize(&mut self, policy: String) {
        self.policy = policy;
    }
}

/// A registered route: its metadata plus the handler, if any.
///
/// Routes without a handler mark a path prefix (see
/// [`Router::path_prefix`](super::Router::path_prefix)); dispatch skips them.
pub struct Route {
    meta: Arc<RouteMeta>,
    handler: Option<Handler>,
}

impl Route {
    pub(crate) fn new(node: NodeId, pattern: String, handler: Option<Handler>) -> Self {
        Self {
            meta: Arc::new(RouteMeta::new(node, pattern)),
            handler,
        }
    }

    pub fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    pub(crate) fn shared_meta(&self) -> Arc<RouteMeta> {
        Arc::clone(&self.meta)
    }

    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn is_method_allowed(&self, method: &Method) -> bool {
        self.meta.is_method_allowed(method)
    }

    // Registration is over before any request holds a clone, so this does
    // not copy in practice.
    fn meta_mut(&mut self) -> &mut RouteMeta {
        Arc::make_mut(&mut self.meta)
    }

    pub(crate) fn apply(&mut self, option: RouteOption) {
        let meta = self.meta_mut();
        match option {
            RouteOption::AllowMethod(method) => meta.allow_method(method),
            RouteOption::AllowMethods(methods) => {
                for method in methods {
                    meta.allow_method(method);
                }
            }
            RouteOption::Authorize(policy) => meta.authorize(policy),
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("meta", &self.meta)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Options applied to a route as it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOption {
    /// Add one allowed method. Repeats are ignored.
    AllowMethod(Method),
    /// Add several allowed methods, in order.
    AllowMethods(Vec<Method>),
    /// Mark the route as protected by the named policy. An empty tag clears it.
    Authorize(String),
}

impl RouteOption {
    pub fn allow(method: Method) -> Self {
        Self::AllowMethod(method)
    }

    pub fn authorize(policy: impl Into<String>) -> Self {
        Self::Authorize(policy.into())
    }
}

/// Builder handle to a freshly registered route.
///
/// # Examples
///
/// ```
/// use trierouter::{Method, Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// let route = router
///     .handle_fn("/reports", |_ctx| async { Response::new(StatusCode::Ok) })
///     .unwrap()
///     .allow_method(Method::Get)
///     .allow_methods([Method::Head, Method::Get])
///     .authorize("reports:read");
///
/// assert_eq!(route.meta().methods(), [Method::Get, Method::Head]);
/// assert_eq!(route.meta().authorization_policy(), Some("reports:read"));
/// ```
#[derive(Debug)]
pub struct RouteMut<'a> {
    route: &'a mut Route,
}

impl<'a> RouteMut<'a> {
    pub(crate) fn new(route: &'a mut Route) -> Self {
        Self { route }
    }

    pub fn allow_method(self, method: Method) -> Self {
        self.route.apply(RouteOption::AllowMethod(method));
        self
    }

    pub fn allow_methods(self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.route
            .apply(RouteOption::AllowMethods(methods.into_iter().collect()));
        self
    }

    pub fn authorize(self, policy: impl Into<String>) -> Self {
        self.route.apply(RouteOption::Authorize(policy.into()));
        self
    }

    /// Apply a batch of [`RouteOption`]s in order.
    pub fn options(self, options: impl IntoIterator<Item = RouteOption>) -> Self {
        for option in options {
            self.route.apply(option);
        }
        self
    }

    pub fn meta(&self) -> &RouteMeta {
        self.route.meta()
    }
}

/// Serializable summary of one route, as returned by
/// [`Router::routes`](super::Router::routes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub pattern: String,
    pub methods: Vec<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    pub has_handler: bool,
}

impl From<&Route> for RouteDescriptor {
    fn from(route: &Route) -> Self {
        let meta = route.meta();
        Self {
            pattern: meta.pattern().to_owned(),
            methods: meta.methods().to_vec(),
            policy: meta.authorization_policy().map(str::to_owned),
            has_handler: route.has_handler(),
        }
    }
}
