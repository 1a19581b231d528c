//! Handler error to JSON response translation.

use serde::Serialize;
use tracing::{error, warn};

use crate::buffer::{Metric, MetricBuffer};
use crate::error::HandlerError;
use crate::response::Response;
use crate::trace::{tags, ActiveSpan};

/// Body of every error response: `{"code":404,"msg":"no such user"}`.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody<'a> {
    pub(crate) code: u16,
    pub(crate) msg: &'a str,
}

/// Turns a handler error into the client response.
///
/// Classified errors keep their status and message; everything else is
/// `500 {"code":500,"msg":"unknown error"}`. Along the way the status is
/// tagged on the span, the failure is logged, and `http_response_code` is
/// appended to the metric buffer.
pub(crate) fn translate(
    err: &HandlerError,
    span: &ActiveSpan,
    metrics: &MetricBuffer,
    method: &str,
    uri: &str,
) -> Response {
    let (status, msg) = err.classify();
    let code = status.as_u16();

    span.set_tag(tags::STATUS_CODE, &code.to_string());

    let _entered = span.tracing_span().map(tracing::Span::entered);
    match err {
        HandlerError::Classified { .. } => error!(method, uri, "{msg}"),
        HandlerError::Unclassified(cause) => error!(method, uri, cause = %cause, "{msg}"),
    }

    metrics.add(Metric::indexed("http_response_code", code.to_string()));

    let body = match serde_json::to_vec(&ErrorBody { code, msg: &msg }) {
        Ok(body) => {
            span.set_tag(tags::RESPONSE_BODY, &String::from_utf8_lossy(&body));
            body
        }
        Err(e) => {
            warn!(method, uri, "could not marshal error response into JSON: {e}");
            Vec::new()
        }
    };

    Response::builder().status(status).json(body)
}
