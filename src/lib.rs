//! # tracewrap
//!
//! Per-request instrumentation for hyper services.
//!
//! Every handler registered on a [`Router`] runs inside a wrapper that, for
//! each request:
//!
//! - opens one root trace span named `"<METHOD> <path>"` and tags it with the
//!   method, url, body and headers (sensitive headers masked);
//! - collects `total_time`, `http_method`, `http_uri` and `client_ip`
//!   metrics, plus whatever the handler adds, and flushes them to a
//!   [`MetricsSink`] in the background once the request is done;
//! - turns a handler [`HandlerError`] into a JSON error response
//!   `{"code":…,"msg":…}` with a matching status code.
//!
//! Span closure and the metrics flush run on every exit path, including a
//! panicking handler, which is answered with a `500`.
//!
//! Routing policy, authentication and rate limiting are not this crate's
//! business: it instruments whatever a handler does.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use tracewrap::{
//!     Context, HandlerError, Instrumentation, Metric, Request, Response, Router, Server, Settings,
//! };
//!
//! struct Users;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tracewrap::Error> {
//!     let instrumentation = Instrumentation::new()
//!         .config(Settings::from_toml(r#"
//!             [proxy]
//!             header_mask_value = "***"
//!             mask_header_keys = ["Authorization"]
//!         "#)?);
//!
//!     let app = Router::new(Users, instrumentation)
//!         .on(Method::GET, "/users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(ctx: Context<Users>, req: Request) -> Result<Response, HandlerError> {
//!     let id = req.param("id").unwrap_or_default();
//!     ctx.metrics().add(Metric::indexed("user_lookup", id));
//!     if id != "42" {
//!         return Err(HandlerError::status(StatusCode::NOT_FOUND, "no such user"));
//!     }
//!     Ok(Response::json(r#"{"id":42,"name":"alice"}"#))
//! }
//! ```

mod buffer;
mod config;
mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod sink;

pub mod middleware;
pub mod trace;

pub use buffer::{Metric, MetricBuffer, MetricValue};
pub use config::{HEADER_MASK_VALUE, Lookup, MASK_HEADER_KEYS, ProxySettings, Settings};
pub use context::Context;
pub use error::{Error, HandlerError};
pub use handler::Handler;
pub use middleware::{Instrumentation, Instrumented};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{DEFAULT_BODY_LIMIT, Router};
pub use server::{Server, serve_with_shutdown};
pub use sink::{LogSink, MetricsSink, RecorderSink, SinkError};
pub use trace::{ActiveSpan, TraceSpan, Tracer, TracingTracer};
