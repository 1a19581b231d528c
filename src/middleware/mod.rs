//! Middleware layer.
//!
//! Every route registered on a [`Router`](crate::Router) runs inside an
//! [`Instrumented`] wrapper, which owns the cross-cutting concerns of a
//! request:
//!
//! - one root trace span, tagged with method, url, body and masked headers
//! - one metric batch, flushed asynchronously when the request ends
//! - uniform JSON error responses for handler errors and panics

mod headers;
mod instrument;
mod translate;

pub use instrument::{Instrumentation, Instrumented};
