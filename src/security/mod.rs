//! Security boundary — where authentication and authorization collaborators
//! plug into the middleware chain.
//!
//! Credential parsing, token verification and policy evaluation live outside
//! this crate; see [`Authenticator`] and [`AuthorizationMiddleware::new`].

mod middleware;

pub use middleware::{
    Authenticated, AuthenticationMiddleware, Authenticator, AuthorizationMiddleware,
};
