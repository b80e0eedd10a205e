//! Response types
//!
//! [`Response`] is an `http::Response` over the boxed [`Body`]. Handlers can
//! return anything implementing [`IntoResponse`]:
//!
//! | Type | Status | Content-Type |
//! |------|--------|--------------|
//! | `()` | 200 | - |
//! | `&'static str` / `String` | 200 | text/plain |
//! | `Bytes` / `Vec<u8>` | 200 | application/octet-stream |
//! | `(StatusCode, T)` | given | from `T` |
//! | [`Response`] | as is | as is |

use crate::body::{empty, full, Body};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};

/// HTTP Response type
pub type Response = http::Response<Body>;

/// Trait for types that can be converted into an HTTP response
pub trait IntoResponse {
    /// Convert self into a Response
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::new(empty())
    }
}

fn with_content_type(body: Body, content_type: &'static str) -> Response {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        with_content_type(full(self), "text/plain; charset=utf-8")
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        with_content_type(full(self), "text/plain; charset=utf-8")
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        with_content_type(full(self), "application/octet-stream")
    }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response {
        Bytes::from(self).into_response()
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        *response.status_mut() = self.0;
        response
    }
}
