//! TestClient for driving a layer stack without network binding
//!
//! # Example
//!
//! ```rust,ignore
//! use exchange_audit_core::{handler_fn, IntoResponse, LayerStack, TestClient, TestRequest};
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let handler = handler_fn(|_req| async { Ok("Hello, World!".into_response()) });
//!     let client = TestClient::new(LayerStack::new(), handler);
//!
//!     let response = client.get("/").await;
//!     response.assert_status(200);
//!     assert_eq!(response.text(), "Hello, World!");
//! }
//! ```

use crate::body::{boxed, full, Body};
use crate::error::{Fault, HandlerResult};
use crate::middleware::{BoxedNext, LayerStack};
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use futures_util::stream;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;

/// Test client sending simulated requests through a layer stack and handler
pub struct TestClient {
    entry: BoxedNext,
}

impl TestClient {
    /// Create a new test client
    pub fn new(layers: LayerStack, handler: BoxedNext) -> Self {
        Self {
            entry: layers.compose(handler),
        }
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    /// Send a POST request with a body
    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> TestResponse {
        self.request(TestRequest::post(path).body(body)).await
    }

    /// Send a request; a fault escaping the stack becomes a 500 response
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        match self.try_request(req).await {
            Ok(response) => response,
            Err(fault) => TestResponse::from_response(fault.into_response()).await,
        }
    }

    /// Send a request and surface a fault escaping the stack
    pub async fn try_request(&self, req: TestRequest) -> HandlerResult<TestResponse> {
        let response = (self.entry)(req.into_request()).await?;
        Ok(TestResponse::from_response(response).await)
    }
}

/// Builder for a simulated request
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    chunks: Option<Vec<Bytes>>,
}

impl TestRequest {
    /// Create a request with any method
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            chunks: None,
        }
    }

    /// GET request
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// POST request
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// PUT request
    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// DELETE request
    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Add a header
    ///
    /// # Panics
    ///
    /// Panics on an invalid header name or value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).expect("invalid header name");
        let value = HeaderValue::from_str(value).expect("invalid header value");
        self.headers.append(name, value);
        self
    }

    /// Set a single-frame body with a matching `Content-Length`
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
        self.chunks = None;
        self
    }

    /// Set a multi-frame body with no declared length
    pub fn chunked<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.headers.remove(header::CONTENT_LENGTH);
        self.chunks = Some(chunks.into_iter().map(Into::into).collect());
        self.body = Bytes::new();
        self
    }

    fn into_request(self) -> Request {
        let body: Body = match self.chunks {
            Some(chunks) => {
                let frames = chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, Fault>(Frame::data(chunk)));
                boxed(StreamBody::new(stream::iter(frames)))
            }
            None => full(self.body),
        };

        let mut builder = http::Request::builder().method(self.method).uri(self.uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        // Only an unparseable URI can fail here, which is a bug in the test.
        let (parts, ()) = builder
            .body(())
            .expect("invalid test request")
            .into_parts();
        Request::new(parts, body)
    }
}

/// A fully collected response
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    async fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8 (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Assert the response status
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status<S>(&self, expected: S) -> &Self
    where
        S: TryInto<StatusCode>,
        S::Error: std::fmt::Debug,
    {
        let expected = expected.try_into().expect("invalid status code");
        assert_eq!(
            self.status, expected,
            "expected status {}, got {} with body {:?}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the body contains `needle`
    ///
    /// # Panics
    ///
    /// Panics if it does not.
    pub fn assert_body_contains(&self, needle: &str) -> &Self {
        let text = self.text();
        assert!(
            text.contains(needle),
            "expected body to contain {:?}, got {:?}",
            needle,
            text
        );
        self
    }
}
