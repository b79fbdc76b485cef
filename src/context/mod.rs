//! Per-request context — the state the router publishes to the middleware
//! chain for one dispatched request.
//!
//! A [`Context`] is created fresh when a route has been selected and travels
//! by value through every middleware down to the handler. It carries:
//!
//! - the [`Request`] itself,
//! - the selected route's metadata ([`RouteMeta`]), including its allowed
//!   methods and authorization-policy tag,
//! - the bound path [`Parameters`],
//! - the decoded [`Query`] multimap,
//! - type-keyed [`Extensions`] that middleware may attach for downstream use.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use crate::Request;
use crate::router::RouteMeta;

/// Type-erased request extensions map — lets middleware hand values to code
/// further down the chain without either side knowing the other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type, if any.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

/// Path parameters bound while matching the request path.
///
/// Keys are the parameter names exactly as written between the braces of the
/// pattern. Values are the request's path segments **lowercased**, the same
/// normalization static segments get during matching.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Decoded query string: every key maps to all of its values in order.
///
/// Keys and values are percent-decoded and `+` is read as a space.
///
/// # Examples
///
/// ```
/// use trierouter::context::Query;
///
/// let query = Query::parse("tag=a&tag=b&name=J%C3%BCrgen+K");
/// assert_eq!(query.get_all("tag"), ["a", "b"]);
/// assert_eq!(query.get("name"), Some("Jürgen K"));
/// assert!(query.get_all("missing").is_empty());
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Query {
    map: HashMap<String, Vec<String>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let mut query = Self::new();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            query.append(key.into_owned(), value.into_owned());
        }
        query
    }

    /// Add one more value under `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.entry(key.into()).or_default().push(value.into());
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// All values for `key`; empty when the key is absent.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request state handed to middleware and handlers.
pub struct Context {
    request: Request,
    route: Option<Arc<RouteMeta>>,
    params: Parameters,
    query: Query,
    extensions: Extensions,
}

impl Context {
    /// Create a context with no route bound, decoding the request's query.
    ///
    /// This is what the fallback 404/405 responders receive.
    pub fn new(request: Request) -> Self {
        let query = request.query_string().map(Query::parse).unwrap_or_default();
        Self {
            request,
            route: None,
            params: Parameters::new(),
            query,
            extensions: Extensions::new(),
        }
    }

    /// Create the context for a selected route and its bound parameters.
    pub fn for_route(request: Request, route: Arc<RouteMeta>, params: Parameters) -> Self {
        let mut ctx = Self::new(request);
        ctx.route = Some(route);
        ctx.params = params;
        ctx
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Metadata of the route selected for this request, if any.
    pub fn route(&self) -> Option<&RouteMeta> {
        self.route.as_deref()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_values(&self, key: &str) -> &[String] {
        self.query.get_all(key)
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Consume the context, giving back the request.
    pub fn into_request(self) -> Request {
        self.request
    }
}
