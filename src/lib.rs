//! # trierouter
//!
//! The request-dispatch core of an embeddable HTTP router: a segment trie
//! that maps request paths to handlers, per-route allowed methods, and onion
//! middleware composed across nested sub-routers.
//!
//! ## Quick Start
//!
//! ```rust
//! use trierouter::{Method, Request, Response, Router, StatusCode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut router = Router::new();
//! router.use_fn(|ctx, next| async move {
//!     let mut response = next.run(ctx).await;
//!     response.add_header("X-Powered-By", "trierouter");
//!     response
//! });
//!
//! {
//!     let mut api = router.mount("/api").unwrap();
//!     api.handle_fn("/items/{id}", |ctx| async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         Response::new(StatusCode::Ok).body(id)
//!     })
//!     .unwrap()
//!     .allow_method(Method::Get);
//! }
//!
//! let response = router.serve(Request::new(Method::Get, "/api/items/42")).await;
//! assert_eq!(response.status(), StatusCode::Ok);
//! assert_eq!(response.body_str(), Some("42"));
//! assert_eq!(response.headers().get("x-powered-by"), Some("trierouter"));
//! # }
//! ```
//!
//! The crate decides *which* handler runs and *what* runs around it.
//! Connections, TLS, body framing and response serialization belong to the
//! embedding server.

pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;

pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Handler, Router, RouterError, SubRouter, handler_fn};
