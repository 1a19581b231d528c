//! Minimal tracewrap example: a small user API whose every request is
//! traced, measured and error-normalized.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i http://localhost:3000/users/7            # 404 JSON error
//!   curl -i -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer secret' -d '{"name":"alice"}'
//!   curl -i -X POST http://localhost:3000/users -d 'oops'   # 500 JSON error

use std::sync::atomic::{AtomicU64, Ordering};

use http::{Method, StatusCode};
use tracewrap::{
    Context, HandlerError, Instrumentation, LogSink, Metric, Request, Response, Router, Server,
    Settings,
};
use tracing_subscriber::EnvFilter;

const SETTINGS: &str = r#"
[proxy]
header_mask_value = "***"
mask_header_keys = ["Authorization", "Cookie"]
"#;

struct Users {
    next_id: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<(), tracewrap::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let instrumentation = Instrumentation::new()
        .sink(LogSink)
        .config(Settings::from_toml(SETTINGS)?);

    let app = Router::new(Users { next_id: AtomicU64::new(100) }, instrumentation)
        .on(Method::GET,  "/users/{id}", get_user)
        .on(Method::POST, "/users",      create_user);

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/{id}
async fn get_user(_ctx: Context<Users>, req: Request) -> Result<Response, HandlerError> {
    match req.param("id") {
        Some("42") => Ok(Response::json(r#"{"id":"42","name":"alice"}"#)),
        _ => Err(HandlerError::status(StatusCode::NOT_FOUND, "no such user")),
    }
}

// POST /users
//
// A malformed body is an unclassified error: the client sees a plain 500.
async fn create_user(ctx: Context<Users>, req: Request) -> Result<Response, HandlerError> {
    let mut user: serde_json::Value = serde_json::from_slice(req.body())?;
    let Some(fields) = user.as_object_mut() else {
        return Err(HandlerError::status(StatusCode::BAD_REQUEST, "expected a JSON object"));
    };
    let id = ctx.state().next_id.fetch_add(1, Ordering::Relaxed);
    fields.insert("id".to_owned(), id.into());

    ctx.span().set_tag("user.id", &id.to_string());
    ctx.metrics().add(Metric::indexed("user_created", "true"));

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", &format!("/users/{id}"))
        .json(serde_json::to_vec(&user)?))
}
