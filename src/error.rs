//! Unified error types.

use std::error::Error as StdError;

use http::StatusCode;
use thiserror::Error;

/// The error type returned by tracewrap's fallible operations.
///
/// Application-level failures are expressed as [`HandlerError`] values and
/// end up as JSON error responses. This type surfaces infrastructure
/// failures: binding to a port, accepting a connection, loading settings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

/// The outcome of a failed handler.
///
/// The variant is the only thing the error translator looks at. A
/// `Classified` error carries the status and the message the client will
/// see; anything else becomes `500` with a fixed message so internals never
/// leak into a response body.
///
/// ```rust
/// use http::StatusCode;
/// use tracewrap::HandlerError;
///
/// let not_found = HandlerError::status(StatusCode::NOT_FOUND, "no such user");
/// let opaque = HandlerError::other(std::io::Error::other("disk on fire"));
///
/// assert_eq!(not_found.classify().0, StatusCode::NOT_FOUND);
/// assert_eq!(opaque.classify(), (StatusCode::INTERNAL_SERVER_ERROR, "unknown error".to_owned()));
/// ```
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{status}: {msg}")]
    Classified { status: StatusCode, msg: String },

    #[error("{0}")]
    Unclassified(Box<dyn StdError + Send + Sync + 'static>),
}

/// Message sent to clients for every unclassified error.
pub(crate) const UNKNOWN_ERROR: &str = "unknown error";

impl HandlerError {
    /// A classified error: the client receives `status` and `msg`.
    pub fn status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self::Classified { status, msg: msg.into() }
    }

    /// An unclassified error: the client receives a generic `500`.
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Unclassified(err.into())
    }

    /// The status code and client-facing message for this error.
    pub fn classify(&self) -> (StatusCode, String) {
        match self {
            Self::Classified { status, msg } => (*status, msg.clone()),
            Self::Unclassified(_) => (StatusCode::INTERNAL_SERVER_ERROR, UNKNOWN_ERROR.to_owned()),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::other(e)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::other(e)
    }
}

/// A panic caught while running a handler.
#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
pub(crate) struct Panicked(pub(crate) String);

impl Panicked {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self(msg)
    }
}
