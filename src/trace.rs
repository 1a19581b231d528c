//! Tracer backend interface and the default `tracing` implementation.
//!
//! A request gets exactly one root span. The wrapper opens it through a
//! [`Tracer`], tags it, hands an [`ActiveSpan`] to the handler, and finishes
//! it from a drop guard so the span is closed on every exit path.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::Empty;

/// Well-known tag names written by the wrapper.
pub mod tags {
    pub const REQUEST_BODY: &str = "http.request_body";
    pub const URL: &str = "http.url";
    pub const METHOD: &str = "http.method";
    pub const HEADERS: &str = "http.headers";
    pub const STATUS_CODE: &str = "http.status_code";
    pub const RESPONSE_BODY: &str = "http.response_body";
}

/// Creates root spans. Shared by every request, so it must be thread-safe.
pub trait Tracer: Send + Sync + 'static {
    fn start_span(&self, name: &str) -> Arc<dyn TraceSpan>;
}

/// One traced operation.
///
/// Methods take `&self`: the same span is reachable from the wrapper and the
/// handler at once.
pub trait TraceSpan: Send + Sync {
    fn set_tag(&self, key: &str, value: &str);

    /// Close the span. Called exactly once per request by the wrapper.
    fn finish(&self);

    /// The `tracing` span backing this span, if any. The handler future is
    /// instrumented with it so handler events nest under the request.
    fn tracing_span(&self) -> Option<tracing::Span> {
        None
    }
}

/// Handle to the request's root span, given to handlers via
/// [`Context::span`](crate::Context::span).
#[derive(Clone)]
pub struct ActiveSpan(Arc<dyn TraceSpan>);

impl ActiveSpan {
    pub fn set_tag(&self, key: &str, value: &str) {
        self.0.set_tag(key, value);
    }

    pub(crate) fn tracing_span(&self) -> Option<tracing::Span> {
        self.0.tracing_span()
    }
}

impl fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActiveSpan")
    }
}

/// Finishes the span when dropped, including during a panic unwind.
pub(crate) struct SpanGuard(ActiveSpan);

impl SpanGuard {
    pub(crate) fn open(tracer: &dyn Tracer, name: &str) -> Self {
        Self(ActiveSpan(tracer.start_span(name)))
    }

    pub(crate) fn span(&self) -> &ActiveSpan {
        &self.0
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.0.0.finish();
    }
}

// ── tracing backend ───────────────────────────────────────────────────────────

/// Default [`Tracer`]: every span is a `tracing` span at `INFO` level.
///
/// `tracing` only records fields declared when the span is created, so the
/// well-known tags in [`tags`] are declared up front. Tags with any other
/// name are ignored by this backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn start_span(&self, name: &str) -> Arc<dyn TraceSpan> {
        let span = tracing::info_span!(
            "http.request",
            otel.name = %name,
            http.method = Empty,
            http.url = Empty,
            http.headers = Empty,
            http.request_body = Empty,
            http.status_code = Empty,
            http.response_body = Empty,
        );
        Arc::new(TracingSpan(Mutex::new(Some(span))))
    }
}

/// Holds the span until [`finish`](TraceSpan::finish) drops it.
struct TracingSpan(Mutex<Option<tracing::Span>>);

impl TraceSpan for TracingSpan {
    fn set_tag(&self, key: &str, value: &str) {
        if let Some(span) = self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            span.record(key, value);
        }
    }

    fn finish(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn tracing_span(&self) -> Option<tracing::Span> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
