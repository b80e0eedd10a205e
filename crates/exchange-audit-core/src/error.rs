//! Error types for the exchange pipeline

use crate::body::full;
use crate::response::Response;
use http::{header, HeaderValue, StatusCode};
use std::any::Any;
use std::fmt;

/// Boxed error used by body streams and downstream handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What every step of the middleware chain resolves to.
pub type HandlerResult<T = Response, E = Fault> = std::result::Result<T, E>;

/// Body text used when a fault carries no message.
pub const DEFAULT_FAULT_PLACEHOLDER: &str = "exception.";

/// How downstream processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The handler returned an error.
    Handler,
    /// The handler panicked.
    Panic,
    /// The response body stream failed while it was being drained.
    Body,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Handler => write!(f, "handler"),
            FaultKind::Panic => write!(f, "panic"),
            FaultKind::Body => write!(f, "body"),
        }
    }
}

/// A failure raised by downstream processing.
///
/// Faults travel up the middleware chain as the `Err` side of
/// [`HandlerResult`]. Whoever sits at the top of the chain turns them into a
/// 500 response with [`Fault::into_response`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} fault: {message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
}

impl Fault {
    /// Create a handler fault with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(FaultKind::Handler, message)
    }

    /// Create a fault of a specific kind
    pub fn with_kind(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a fault from a caught panic payload.
    ///
    /// `panic!` payloads are either `&'static str` or `String`; anything else
    /// produces an empty message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Self::with_kind(FaultKind::Panic, message)
    }

    /// Build a fault from a failed response body stream
    pub fn from_body_error(err: BoxError) -> Self {
        Self::with_kind(FaultKind::Body, err.to_string())
    }

    /// The fault kind
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// The raw message, possibly empty
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The message, or `placeholder` when the message is blank
    pub fn message_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        if self.message.trim().is_empty() {
            placeholder
        } else {
            &self.message
        }
    }

    /// Synthesize the 500 response a caller receives for this fault.
    pub fn into_response(self) -> Response {
        self.to_response(DEFAULT_FAULT_PLACEHOLDER)
    }

    /// Synthesize a 500 response using a custom placeholder for blank messages
    pub fn to_response(&self, placeholder: &str) -> Response {
        let body = self.message_or(placeholder).to_string();
        let mut response = Response::new(full(body));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl From<BoxError> for Fault {
    fn from(err: BoxError) -> Self {
        Fault::new(err.to_string())
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Fault::new(err.to_string())
    }
}

impl From<hyper::Error> for Fault {
    fn from(err: hyper::Error) -> Self {
        Fault::new(err.to_string())
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault::new(message)
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Fault::new(message)
    }
}
