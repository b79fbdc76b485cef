//! Builds a small router, prints its route table and dispatches a few
//! in-memory requests through it.
//!
//! ```text
//! RUST_LOG=trierouter=trace cargo run --example route_table
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use trierouter::middleware::LoggerMiddleware;
use trierouter::security::{AuthenticationMiddleware, AuthorizationMiddleware};
use trierouter::{Method, Request, Response, Router, RouterError, StatusCode};

#[derive(Debug)]
struct ApiKey(String);

fn build() -> Result<Router, RouterError> {
    let mut router = Router::new();
    router
        .use_middleware(LoggerMiddleware)
        .use_middleware(AuthenticationMiddleware::new(|req: &Request| {
            req.headers().get("x-api-key").map(|key| ApiKey(key.to_owned()))
        }))
        .use_middleware(AuthorizationMiddleware::new(|policy: &str, key: &ApiKey| {
            key.0 == policy
        }));

    router
        .handle_fn("/", |_ctx| async {
            Response::new(StatusCode::Ok).body("index")
        })?
        .allow_method(Method::Get);

    let mut api = router.mount("/api")?;
    api.use_fn(|ctx, next| async move {
        let mut response = next.run(ctx).await;
        response.add_header("Content-Type", "text/plain; charset=utf-8");
        response
    });
    api.handle_fn("/users/{id}", |ctx| async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let fields = ctx.query_values("field").join(",");
        Response::new(StatusCode::Ok).body(format!("user {id} [{fields}]"))
    })?
    .allow_methods([Method::Get, Method::Head]);
    api.handle_fn("/admin", |_ctx| async {
        Response::new(StatusCode::Ok).body("welcome, admin")
    })?
    .allow_method(Method::Get)
    .authorize("secret");

    Ok(router)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let router = Arc::new(build()?);
    println!("{}", router.routes_json()?);

    let requests = [
        Request::new(Method::Get, "/"),
        Request::new(Method::Get, "/API/Users/Alice?field=name&field=email"),
        Request::new(Method::Delete, "/api/users/alice"),
        Request::new(Method::Get, "/api/admin"),
        Request::new(Method::Get, "/api/admin").with_header("X-Api-Key", "secret"),
        Request::new(Method::Get, "/nowhere"),
    ];

    for request in requests {
        let line = format!("{} {}", request.method(), request.path());
        let response = router.serve(request).await;
        println!(
            "{line:<48} -> {} {}",
            response.status().as_u16(),
            response.body_str().unwrap_or_default()
        );
    }

    Ok(())
}
