//! Request types for the exchange pipeline

use crate::body::{boxed, empty, Body, ReplayBody};
use crate::error::BoxError;
use bytes::Bytes;
use http::{header, request::Parts, Extensions, HeaderMap, Method, Uri, Version};
use http_body_util::BodyExt;

/// HTTP Request wrapper
///
/// Provides access to all parts of an incoming HTTP request. The body starts
/// out as a one-shot stream; after [`Request::enable_buffering`] it is held
/// as a [`ReplayBody`] and can be read, rewound and read again.
pub struct Request {
    pub(crate) parts: Parts,
    stream: Option<Body>,
    replay: Option<ReplayBody>,
}

impl Request {
    /// Create a new request from parts and a streaming body
    pub fn new(parts: Parts, body: Body) -> Self {
        Self {
            parts,
            stream: Some(body),
            replay: None,
        }
    }

    /// Convert any `http::Request` with a compatible body
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self::new(parts, boxed(body))
    }

    /// Get the HTTP method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Get the URI
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Get request extensions
    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    /// Get mutable extensions
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.parts.extensions
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Get the query string (without the leading `?`)
    pub fn query_string(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// Declared `Content-Length`, if present and well formed
    pub fn content_length(&self) -> Option<u64> {
        self.parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Whether the body has been buffered
    pub fn is_buffered(&self) -> bool {
        self.replay.is_some()
    }

    /// Buffer the body so it can be read more than once.
    ///
    /// Must be called before the first read. Idempotent: a body that is
    /// already buffered is returned as is, cursor untouched.
    pub async fn enable_buffering(&mut self) -> &mut ReplayBody {
        self.enable_buffering_limited(None).await
    }

    /// Buffer the body, holding at most `limit` bytes in memory.
    ///
    /// A longer body is cut at the limit and replays as a failed stream (see
    /// [`ReplayBody::buffer_limited`]). Like [`Request::enable_buffering`],
    /// this does nothing to a body that is already buffered.
    pub async fn enable_buffering_limited(&mut self, limit: Option<usize>) -> &mut ReplayBody {
        if let Some(stream) = self.stream.take() {
            self.replay = Some(ReplayBody::buffer_limited(stream, limit).await);
        }
        self.replay.get_or_insert_with(ReplayBody::empty)
    }

    /// The buffered body, if buffering was enabled
    pub fn replay_body_mut(&mut self) -> Option<&mut ReplayBody> {
        self.replay.as_mut()
    }

    /// Read the body from its current position to the end.
    ///
    /// On a streaming body this consumes the stream. On a buffered body it
    /// advances the cursor, which can be rewound afterwards.
    pub async fn bytes(&mut self) -> Result<Bytes, BoxError> {
        if let Some(replay) = self.replay.as_mut() {
            return replay.read_remaining();
        }
        match self.stream.take() {
            Some(stream) => Ok(stream.collect().await?.to_bytes()),
            None => Ok(Bytes::new()),
        }
    }

    /// Take the body as a stream, leaving an empty one behind.
    ///
    /// A buffered body streams from its current cursor.
    pub fn take_body(&mut self) -> Body {
        if let Some(replay) = self.replay.take() {
            self.replay = Some(ReplayBody::empty());
            return boxed(replay);
        }
        self.stream.take().unwrap_or_else(empty)
    }

    /// Split into parts and body stream
    pub fn into_parts(mut self) -> (Parts, Body) {
        let body = self.take_body();
        (self.parts, body)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("version", &self.parts.version)
            .field("buffered", &self.is_buffered())
            .finish()
    }
}
