//! Exchange records and their assembly
//!
//! A record starts life as [`RequestFacts`], collected before downstream runs,
//! and is completed exactly once by a [`RecordBuilder`] with either the
//! response that came back or the fault that replaced it. Assembly is pure:
//! no I/O and no clock reads, timestamps are passed in.

use crate::correlation::ExchangeId;
use chrono::{DateTime, Utc};
use exchange_audit_core::Request;
use http::{header, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// Header name fragment that is never recorded.
pub const ALWAYS_EXCLUDED_HEADER: &str = "authorization";

/// Outcome message for an exchange dropped before it finished.
pub const CANCELLED_MESSAGE: &str = "exchange cancelled";

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Outcome {
    /// Downstream returned a response (whatever its status)
    Success,
    /// Downstream faulted or the exchange was cancelled
    Failure(String),
}

impl Outcome {
    /// Whether downstream returned normally
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// The error summary of a failure
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

/// One audited request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub exchange_id: ExchangeId,
    pub request_time: DateTime<Utc>,
    pub response_time: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub method: String,
    pub origin: String,
    pub query_string: String,
    pub headers: String,
    pub request_body: String,
    pub response_body: String,
    pub status_code: u16,
    pub actor: String,
    pub outcome: Outcome,
    pub recorded_by: String,
}

/// Everything known about an exchange before downstream runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFacts {
    pub exchange_id: ExchangeId,
    pub request_time: DateTime<Utc>,
    pub method: String,
    pub origin: String,
    pub query_string: String,
    pub headers: String,
    pub request_body: String,
    pub actor: String,
}

impl RequestFacts {
    /// Collect the request line, origin and sanitized headers of `req`.
    ///
    /// The body is filled in separately with
    /// [`RecordBuilder::set_request_body`] once it has been captured.
    pub fn from_request(
        req: &Request,
        exchange_id: ExchangeId,
        actor: Option<String>,
        excluded_headers: &[String],
        request_time: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange_id,
            request_time,
            method: req.method().to_string(),
            origin: origin(req),
            query_string: query_string(req.query_string()),
            headers: sanitize_headers(req.headers(), excluded_headers),
            request_body: String::new(),
            actor: actor.unwrap_or_default(),
        }
    }
}

/// What came back from downstream on a normal return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFacts {
    pub status: StatusCode,
    pub body: String,
}

/// Completes [`RequestFacts`] into an [`ExchangeRecord`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    facts: RequestFacts,
    recorded_by: String,
}

impl RecordBuilder {
    /// Start from the request phase draft
    pub fn new(facts: RequestFacts) -> Self {
        Self {
            facts,
            recorded_by: String::new(),
        }
    }

    /// Stamp the record with the recording service's name
    pub fn recorded_by(mut self, name: impl Into<String>) -> Self {
        self.recorded_by = name.into();
        self
    }

    /// Attach the captured request body.
    ///
    /// Until this is called the record carries an empty request body, which
    /// is what a cancelled exchange records if it never got this far.
    pub fn set_request_body(&mut self, body: String) {
        self.facts.request_body = body;
    }

    /// Downstream returned normally.
    ///
    /// The response body is recorded as `"<status>: <text>"`. Any status,
    /// including 5xx, counts as success.
    pub fn success(self, response: ResponseFacts, at: DateTime<Utc>) -> ExchangeRecord {
        let body = format!("{}: {}", response.status.as_u16(), response.body);
        self.finish(response.status, body, Outcome::Success, at)
    }

    /// Downstream faulted; `message` is what the caller received
    pub fn failure(self, message: &str, at: DateTime<Utc>) -> ExchangeRecord {
        self.finish(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.to_string(),
            Outcome::Failure(message.to_string()),
            at,
        )
    }

    /// The exchange was dropped before it finished
    pub fn cancelled(self, at: DateTime<Utc>) -> ExchangeRecord {
        self.failure(CANCELLED_MESSAGE, at)
    }

    fn finish(
        self,
        status: StatusCode,
        response_body: String,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> ExchangeRecord {
        let RequestFacts {
            exchange_id,
            request_time,
            method,
            origin,
            query_string,
            headers,
            request_body,
            actor,
        } = self.facts;

        // The wall clock can step backwards between the two reads.
        let response_time = at.max(request_time);
        let elapsed_ms = (response_time - request_time)
            .num_milliseconds()
            .try_into()
            .unwrap_or(0);

        ExchangeRecord {
            exchange_id,
            request_time,
            response_time,
            elapsed_ms,
            method,
            origin,
            query_string,
            headers,
            request_body,
            response_body,
            status_code: status.as_u16(),
            actor,
            outcome,
            recorded_by: self.recorded_by,
        }
    }
}

/// Whether a header name is kept in the record.
///
/// Names are compared case-insensitively; `authorization` is always excluded
/// on top of `excluded`.
pub fn is_recorded_header(name: &str, excluded: &[String]) -> bool {
    let name = name.to_ascii_lowercase();
    if name.contains(ALWAYS_EXCLUDED_HEADER) {
        return false;
    }
    !excluded
        .iter()
        .filter(|fragment| !fragment.is_empty())
        .any(|fragment| name.contains(&fragment.to_ascii_lowercase()))
}

/// One `name:value` line per recorded header value, in request order.
pub fn sanitize_headers(headers: &HeaderMap, excluded: &[String]) -> String {
    let mut block = String::new();
    for (name, value) in headers {
        if !is_recorded_header(name.as_str(), excluded) {
            continue;
        }
        block.push_str(name.as_str());
        block.push(':');
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push('\n');
    }
    block
}

/// `scheme://host/path` of the request.
///
/// Origin-form request targets carry no scheme or authority, so those fall
/// back to `http` and the `Host` header.
pub fn origin(req: &Request) -> String {
    let uri = req.uri();
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            req.headers()
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();
    format!("{}://{}{}", scheme, host, uri.path())
}

/// The query string with its leading `?`, or empty.
pub fn query_string(query: Option<&str>) -> String {
    match query {
        Some(query) => format!("?{}", query),
        None => String::new(),
    }
}
