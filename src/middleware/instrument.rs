//! The request wrapper.
//!
//! Per request, in this order:
//!
//! 1. open the metric buffer; its [`FlushGuard`] flushes it on scope exit
//! 2. open the root span; its `SpanGuard` finishes it on scope exit
//! 3. tag the span with method, url, body and masked headers
//! 4. run the handler, catching panics
//! 5. on error, translate it into a JSON error response
//!
//! Guards drop in reverse order: the span closes first, then the metrics
//! flush is spawned. Both run on every exit path, unwinds included.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::{debug, warn, Instrument};

use crate::buffer::{Metric, MetricBuffer};
use crate::config::{Lookup, MaskRules, Settings};
use crate::context::Context;
use crate::error::{HandlerError, Panicked};
use crate::handler::{BoxedHandler, Handler, HandlerResult};
use crate::request::Request;
use crate::response::Response;
use crate::sink::{LogSink, MetricsSink};
use crate::trace::{tags, ActiveSpan, SpanGuard, Tracer, TracingTracer};

use super::{headers, translate};

// ── Collaborators ─────────────────────────────────────────────────────────────

/// The shared collaborators every wrapped handler reports to.
///
/// Defaults: [`TracingTracer`], [`LogSink`], and default [`Settings`]
/// (mask value `"omitted"`, nothing masked).
#[derive(Clone)]
pub struct Instrumentation {
    tracer: Arc<dyn Tracer>,
    sink: Arc<dyn MetricsSink>,
    config: Arc<dyn Lookup>,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self {
            tracer: Arc::new(TracingTracer),
            sink: Arc::new(LogSink),
            config: Arc::new(Settings::default()),
        }
    }

    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    pub fn sink(mut self, sink: impl MetricsSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Configuration source for header masking, read on every request.
    pub fn config(mut self, config: impl Lookup) -> Self {
        self.config = Arc::new(config);
        self
    }
}

impl Default for Instrumentation {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation").finish_non_exhaustive()
    }
}

// ── Instrumented ──────────────────────────────────────────────────────────────

/// A handler wrapped with tracing, metrics and error translation.
///
/// ```rust,no_run
/// use http::StatusCode;
/// use tracewrap::{Context, HandlerError, Instrumentation, Instrumented, Request, Response};
///
/// struct Db;
///
/// async fn get_user(ctx: Context<Db>, req: Request) -> Result<Response, HandlerError> {
///     let _db = ctx.state();
///     match req.param("id") {
///         Some("42") => Ok(Response::json(r#"{"id":42}"#)),
///         _ => Err(HandlerError::status(StatusCode::NOT_FOUND, "no such user")),
///     }
/// }
///
/// let wrapped = Instrumented::new(get_user, Db, Instrumentation::default());
/// ```
pub struct Instrumented<S> {
    handler: BoxedHandler<S>,
    state: Arc<S>,
    instrumentation: Instrumentation,
}

impl<S: Send + Sync + 'static> Instrumented<S> {
    pub fn new(handler: impl Handler<S>, state: impl Into<Arc<S>>, instrumentation: Instrumentation) -> Self {
        Self {
            handler: handler.into_boxed_handler(),
            state: state.into(),
            instrumentation,
        }
    }

    /// Runs one request through the wrapped handler.
    ///
    /// Always produces a response: the handler's own on success, a JSON
    /// error response otherwise.
    pub async fn call(&self, req: Request) -> Response {
        let method = req.method().as_str().to_owned();
        let uri = req.path().to_owned();

        let metrics = MetricBuffer::new();
        let _flush = FlushGuard {
            started: Instant::now(),
            metrics: metrics.clone(),
            sink: Arc::clone(&self.instrumentation.sink),
            method: method.clone(),
            uri: uri.clone(),
            client_ip: req.client_ip(),
        };

        let span = SpanGuard::open(&*self.instrumentation.tracer, &format!("{method} {uri}"));
        annotate(span.span(), &req, &*self.instrumentation.config);

        let ctx = Context::new(metrics.clone(), Arc::clone(&self.state), span.span().clone());

        match self.invoke(ctx, req, span.span()).await {
            Ok(res) => res,
            Err(err) => translate::translate(&err, span.span(), &metrics, &method, &uri),
        }
    }

    /// Calls the handler. A panic, whether raised while building the future
    /// or while polling it, becomes an unclassified error.
    async fn invoke(&self, ctx: Context<S>, req: Request, span: &ActiveSpan) -> HandlerResult {
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.call(ctx, req))) {
            Ok(fut) => fut,
            Err(payload) => return Err(HandlerError::other(Panicked::from_payload(&*payload))),
        };

        let fut = match span.tracing_span() {
            Some(parent) => fut.instrument(parent).boxed(),
            None => fut,
        };

        AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(HandlerError::other(Panicked::from_payload(&*payload))))
    }
}

impl<S> fmt::Debug for Instrumented<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented").finish_non_exhaustive()
    }
}

/// Tags the root span with what the request looked like on arrival.
fn annotate(span: &ActiveSpan, req: &Request, config: &dyn Lookup) {
    span.set_tag(tags::REQUEST_BODY, &String::from_utf8_lossy(req.body()));
    span.set_tag(tags::URL, req.path());
    span.set_tag(tags::METHOD, req.method().as_str());

    let rules = MaskRules::from_lookup(config);
    match serde_json::to_string(&headers::project(req.headers(), &rules)) {
        Ok(json) => span.set_tag(tags::HEADERS, &json),
        Err(e) => warn!("could not marshal request headers into JSON, span will lack them: {e}"),
    }
}

// ── Metrics flush ─────────────────────────────────────────────────────────────

/// Appends the request metrics and spawns the sink write when dropped.
struct FlushGuard {
    started: Instant,
    metrics: MetricBuffer,
    sink: Arc<dyn MetricsSink>,
    method: String,
    uri: String,
    client_ip: String,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let elapsed = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.metrics.extend([
            Metric::new("total_time", elapsed),
            Metric::indexed("http_method", self.method.as_str()),
            Metric::new("http_uri", self.uri.as_str()),
            Metric::new("client_ip", self.client_ip.as_str()),
        ]);
        let batch = self.metrics.take();
        let sink = Arc::clone(&self.sink);

        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(uri = %self.uri, "no tokio runtime, dropping request metrics");
            return;
        };
        rt.spawn(async move {
            match sink.write(&batch).await {
                Ok(()) => debug!("wrote request metrics"),
                Err(e) => warn!("error writing request metrics: {e}"),
            }
        });
    }
}
