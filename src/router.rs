//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every handler is wrapped
//! in an [`Instrumented`] at registration time, so lookups hand back a
//! handler that already traces, measures and translates errors. Requests
//! that match no route go to an instrumented fallback answering
//! `404 {"code":404,"msg":"not found"}`.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::context::Context;
use crate::error::HandlerError;
use crate::handler::Handler;
use crate::middleware::{Instrumentation, Instrumented};
use crate::request::Request;
use crate::response::Response;

/// Request bodies larger than this are dropped unless
/// [`Router::body_limit`] says otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
pub struct Router<S> {
    routes: HashMap<Method, MatchitRouter<Arc<Instrumented<S>>>>,
    fallback: Arc<Instrumented<S>>,
    state: Arc<S>,
    instrumentation: Instrumentation,
    body_limit: usize,
}

async fn not_found<S>(_: Context<S>, _: Request) -> Result<Response, HandlerError> {
    Err(HandlerError::status(StatusCode::NOT_FOUND, "not found"))
}

impl<S: Send + Sync + 'static> Router<S> {
    /// A router whose handlers share `state` and report to `instrumentation`.
    pub fn new(state: impl Into<Arc<S>>, instrumentation: Instrumentation) -> Self {
        let state: Arc<S> = state.into();
        let fallback = Instrumented::new(not_found::<S>, Arc::clone(&state), instrumentation.clone());
        Self {
            routes: HashMap::new(),
            fallback: Arc::new(fallback),
            state,
            instrumentation,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Caps the number of request body bytes buffered per request.
    ///
    /// A body over the cap is treated like one that failed to read: the
    /// request proceeds with an empty body and a `warn` is logged.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub(crate) fn max_body_bytes(&self) -> usize {
        self.body_limit
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use tracewrap::{Context, HandlerError, Instrumentation, Request, Response, Router};
    /// # async fn get_user(_: Context<()>, _: Request) -> Result<Response, HandlerError> { Ok(Response::text("")) }
    /// # async fn create_user(_: Context<()>, _: Request) -> Result<Response, HandlerError> { Ok(Response::text("")) }
    /// Router::new((), Instrumentation::default())
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler<S>) -> Self {
        let wrapped = Instrumented::new(handler, Arc::clone(&self.state), self.instrumentation.clone());
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(wrapped))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<Instrumented<S>>, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Like [`lookup`](Router::lookup), but unmatched requests resolve to the
    /// `404` fallback.
    pub(crate) fn route(
        &self,
        method: &Method,
        path: &str,
    ) -> (Arc<Instrumented<S>>, HashMap<String, String>) {
        self.lookup(method, path)
            .unwrap_or_else(|| (Arc::clone(&self.fallback), HashMap::new()))
    }
}
