//! Request-level error types.
//!
//! # Design Decisions
//! - One `WebError` travels through the dispatcher; subsystem errors convert via `From`
//! - Recovered panics are normalized into [`PanicError`] so they take the same
//!   escalation path as ordinary errors

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use thiserror::Error;

use crate::routing::path::PathError;
use crate::routing::registry::ReverseError;
use crate::routing::router::RouterError;
use crate::session::SessionError;
use crate::template::TemplateError;

/// Boxed error used for foreign error sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced while handling a single request.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("action for method {0:?} not found and no \"any\" fallback")]
    ActionNotFound(String),

    #[error("controller panic: {0}")]
    Panic(#[from] PanicError),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Reverse(#[from] ReverseError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),

    #[error("{0}")]
    Other(BoxError),
}

impl WebError {
    /// Create a plain message error.
    pub fn msg(message: impl Into<String>) -> Self {
        WebError::Message(message.into())
    }

    /// Full error chain, `outer: inner: ...`.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            let next = err.to_string();
            if !out.ends_with(&next) {
                out.push_str(": ");
                out.push_str(&next);
            }
            source = err.source();
        }
        out
    }
}

/// An uncontrolled failure recovered during request handling.
pub struct PanicError {
    message: String,
    source: Option<BoxError>,
    backtrace: String,
}

impl PanicError {
    /// Normalize a panic payload obtained from `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return Self::new(message.to_string(), None),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return Self::new(*message, None),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<WebError>() {
            Ok(err) => return Self::new(err.to_string(), Some(err)),
            Err(payload) => payload,
        };
        match payload.downcast::<BoxError>() {
            Ok(err) => Self::new(err.to_string(), Some(*err)),
            Err(_) => Self::new("panic with a non-error payload".to_string(), None),
        }
    }

    fn new(message: String, source: Option<BoxError>) -> Self {
        Self {
            message,
            source,
            backtrace: Backtrace::capture().to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured at recovery time. Empty unless `RUST_BACKTRACE` is set.
    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicError")
            .field("message", &self.message)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PanicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
