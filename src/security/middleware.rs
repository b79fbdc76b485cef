//! Authentication and authorization links for the middleware chain.
//!
//! Neither middleware knows how credentials are checked or how policies are
//! evaluated. They only connect external collaborators to what the router
//! publishes on the [`Context`]:
//!
//! - [`AuthenticationMiddleware`] asks an [`Authenticator`] for an identity and
//!   stores it as [`Authenticated`] in the request extensions.
//! - [`AuthorizationMiddleware`] reads the selected route's policy tag and the
//!   stored identity, and answers `401`/`403` before the handler runs.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::{
    Request, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// Something that can establish who sent a request.
///
/// Returning `None` means "anonymous", not "rejected": whether anonymous
/// requests may proceed is decided by [`AuthorizationMiddleware`] from the
/// route's policy tag.
pub trait Authenticator: Send + Sync + 'static {
    type Identity: Send + Sync + 'static;

    fn authenticate(&self, request: &Request) -> Option<Self::Identity>;
}

impl<F, I> Authenticator for F
where
    F: Fn(&Request) -> Option<I> + Send + Sync + 'static,
    I: Send + Sync + 'static,
{
    type Identity = I;

    fn authenticate(&self, request: &Request) -> Option<I> {
        self(request)
    }
}

/// Identity attached to the request extensions by [`AuthenticationMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated<I>(pub I);

/// Runs an [`Authenticator`] and records its result for downstream links.
///
/// # Examples
///
/// ```rust,no_run
/// use trierouter::{Request, Router};
/// use trierouter::security::AuthenticationMiddleware;
///
/// let api_key = |req: &Request| req.headers().get("x-api-key").map(str::to_owned);
///
/// let mut router = Router::new();
/// router.use_middleware(AuthenticationMiddleware::new(api_key));
/// ```
pub struct AuthenticationMiddleware<A> {
    authenticator: Arc<A>,
}

impl<A: Authenticator> AuthenticationMiddleware<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }
}

impl<A: Authenticator> Middleware for AuthenticationMiddleware<A> {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let authenticator = Arc::clone(&self.authenticator);

        Box::pin(async move {
            if let Some(identity) = authenticator.authenticate(ctx.request()) {
                ctx.extensions_mut().insert(Authenticated(identity));
            }
            next.run(ctx).await
        })
    }
}

type PolicyCheck<I> = Arc<dyn Fn(&str, &I) -> bool + Send + Sync>;

/// Enforces the selected route's authorization-policy tag.
///
/// | Route                     | Identity present | Policy check | Outcome          |
/// |---------------------------|------------------|--------------|------------------|
/// | not protected             | any              | not called   | handler runs     |
/// | protected                 | no               | not called   | `401`            |
/// | protected                 | yes              | `false`      | `403`            |
/// | protected                 | yes              | `true`       | handler runs     |
///
/// The identity type `I` must match the authenticator's `Identity`.
///
/// # Examples
///
/// ```rust,no_run
/// use trierouter::security::AuthorizationMiddleware;
///
/// struct User { roles: Vec<String> }
///
/// let authz = AuthorizationMiddleware::new(|policy: &str, user: &User| {
///     user.roles.iter().any(|role| role == policy)
/// });
/// ```
pub struct AuthorizationMiddleware<I> {
    check: PolicyCheck<I>,
    unauthorized: StatusCode,
    forbidden: StatusCode,
    _identity: PhantomData<fn() -> I>,
}

impl<I: Send + Sync + 'static> AuthorizationMiddleware<I> {
    /// `check(policy, identity)` decides whether `identity` satisfies `policy`.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&str, &I) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
            unauthorized: StatusCode::Unauthorized,
            forbidden: StatusCode::Forbidden,
            _identity: PhantomData,
        }
    }

    /// Accept any authenticated identity, whatever the policy tag says.
    pub fn authenticated_only() -> Self {
        Self::new(|_, _| true)
    }
}

impl<I: Send + Sync + 'static> Middleware for AuthorizationMiddleware<I> {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let check = Arc::clone(&self.check);
        let unauthorized = self.unauthorized;
        let forbidden = self.forbidden;

        Box::pin(async move {
            let Some(policy) = ctx.route().and_then(|r| r.authorization_policy()) else {
                return next.run(ctx).await;
            };

            let Some(Authenticated(identity)) = ctx.extensions().get::<Authenticated<I>>() else {
                debug!(policy, "protected route requested without identity");
                return Response::new(unauthorized).body(unauthorized.canonical_reason());
            };

            if !check(policy, identity) {
                debug!(policy, "identity rejected by policy");
                return Response::new(forbidden).body(forbidden.canonical_reason());
            }

            next.run(ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Router};

    #[derive(Debug, Clone)]
    struct User {
        name: String,
        roles: Vec<String>,
    }

    fn from_header(req: &Request) -> Option<User> {
        let raw = req.headers().get("x-user")?;
        let (name, roles) = raw.split_once(':').unwrap_or((raw, ""));
        Some(User {
            name: name.to_owned(),
            roles: roles.split(',').filter(|r| !r.is_empty()).map(str::to_owned).collect(),
        })
    }

    fn router() -> Router {
        let mut router = Router::new();
        router
            .use_middleware(AuthenticationMiddleware::new(from_header))
            .use_middleware(AuthorizationMiddleware::new(|policy: &str, user: &User| {
                user.roles.iter().any(|role| role == policy)
            }));

        router
            .handle_fn("/public", |_ctx| async { Response::new(StatusCode::Ok) })
            .unwrap();
        router
            .handle_fn("/admin", |ctx| async move {
                let name = ctx
                    .extensions()
                    .get::<Authenticated<User>>()
                    .map(|Authenticated(user)| user.name.clone())
                    .unwrap_or_default();
                Response::new(StatusCode::Ok).body(name)
            })
            .unwrap()
            .authorize("admin");
        router
    }

    fn request(path: &str, user: Option<&str>) -> Request {
        let req = Request::new(Method::Get, path);
        match user {
            Some(user) => req.with_header("X-User", user),
            None => req,
        }
    }

    #[tokio::test]
    async fn unprotected_route_allows_anonymous() {
        let res = router().serve(request("/public", None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn protected_route_without_identity_is_unauthorized() {
        let res = router().serve(request("/admin", None)).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn protected_route_with_wrong_role_is_forbidden() {
        let res = router().serve(request("/admin", Some("bob:reader"))).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn protected_route_with_matching_role_reaches_handler() {
        let res = router()
            .serve(request("/admin", Some("alice:reader,admin")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_str(), Some("alice"));
    }

    #[tokio::test]
    async fn authenticated_only_ignores_policy_name() {
        let mut router = Router::new();
        router
            .use_middleware(AuthenticationMiddleware::new(from_header))
            .use_middleware(AuthorizationMiddleware::<User>::authenticated_only());
        router
            .handle_fn("/me", |_ctx| async { Response::new(StatusCode::Ok) })
            .unwrap()
            .authorize("anything");

        let res = router.serve(request("/me", Some("carol"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        let res = router.serve(request("/me", None)).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }
}
