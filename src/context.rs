//! Request-scoped context handed to every wrapped handler.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::buffer::MetricBuffer;
use crate::trace::ActiveSpan;

/// What a handler gets besides the request itself.
///
/// The cancellation token is a fresh root: nothing in tracewrap ever
/// cancels it. Handlers derive child tokens from it for their own work.
pub struct Context<S> {
    cancel: CancellationToken,
    metrics: MetricBuffer,
    state: Arc<S>,
    span: ActiveSpan,
}

impl<S> Context<S> {
    pub(crate) fn new(metrics: MetricBuffer, state: Arc<S>, span: ActiveSpan) -> Self {
        Self { cancel: CancellationToken::new(), metrics, state, span }
    }

    pub fn cancellation(&self) -> &CancellationToken { &self.cancel }

    /// This request's metric buffer; everything appended here is flushed
    /// together with the request metrics.
    pub fn metrics(&self) -> &MetricBuffer { &self.metrics }

    /// Application state shared by all requests.
    pub fn state(&self) -> &S { &self.state }

    /// The request's root span.
    pub fn span(&self) -> &ActiveSpan { &self.span }
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            cancel: self.cancel.clone(),
            metrics: self.metrics.clone(),
            state: Arc::clone(&self.state),
            span: self.span.clone(),
        }
    }
}

impl<S> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
