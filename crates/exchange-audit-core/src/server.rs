//! HTTP server adapter

use crate::body::boxed;
use crate::middleware::{BoxedNext, LayerStack};
use crate::request::Request;
use crate::response::Response;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Runs a [`LayerStack`] in front of a handler on an HTTP/1 listener.
///
/// Every connection is served on its own task; every request gets its own
/// pass through the stack.
pub struct Server {
    entry: BoxedNext,
}

impl Server {
    /// Create a server from a layer stack and the final handler
    pub fn new(layers: LayerStack, handler: BoxedNext) -> Self {
        Self {
            entry: layers.compose(handler),
        }
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!(%addr, "exchange-audit server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let entry = Arc::new(self.entry);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let entry = entry.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let entry = entry.clone();
                    async move { Ok::<_, Infallible>(handle_request(&entry, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%remote_addr, "Connection error: {}", err);
                }
            });
        }
    }
}

/// Handle a single HTTP request
async fn handle_request(entry: &BoxedNext, req: hyper::Request<Incoming>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let (parts, body) = req.into_parts();
    let request = Request::new(parts, boxed(body));

    let response = match entry(request).await {
        Ok(response) => response,
        Err(fault) => {
            // Nothing above us can handle it; answer with a plain 500.
            error!(method = %method, path = %path, error = %fault, "Unhandled fault");
            fault.into_response()
        }
    };

    log_request(&method, &path, response.status(), start);
    response
}

/// Log request completion
fn log_request(method: &http::Method, path: &str, status: StatusCode, start: std::time::Instant) {
    let elapsed = start.elapsed();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::middleware::handler_fn;
    use crate::response::IntoResponse;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn roundtrip(listener_handler: BoxedNext, raw: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(LayerStack::new(), listener_handler);
        tokio::spawn(server.serve(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_serves_echoed_body() {
        let handler = handler_fn(|mut req: Request| async move {
            let body = req.bytes().await?;
            Ok(body.to_vec().into_response())
        });
        let response = roundtrip(
            handler,
            b"POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("hello"));
    }

    #[tokio::test]
    async fn test_fault_becomes_500() {
        let handler = handler_fn(|_req: Request| async { Err(Fault::new("boom")) });
        let response = roundtrip(
            handler,
            b"GET /fail HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"));
        assert!(response.ends_with("boom"));
    }
}
