//! # exchange-audit-core
//!
//! Pipeline primitives shared by the exchange-audit crates.
//!
//! - [`Request`] wraps an inbound HTTP request whose body can be switched to a
//!   seekable, replayable buffer ([`ReplayBody`]).
//! - [`ResponseBuffer`] is an in-memory, seekable stand-in for the outbound
//!   transport.
//! - [`middleware`] holds the continuation-style middleware chain
//!   ([`MiddlewareLayer`], [`BoxedNext`], [`LayerStack`]).
//! - [`Server`] runs a layer stack in front of a handler on hyper's HTTP/1
//!   connection driver.
//!
//! This crate is not meant to be used on its own. Use `exchange-audit` instead.

mod body;
mod buffer;
mod error;
pub mod middleware;
mod request;
mod response;
mod server;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;

// Public API
pub use body::{boxed, empty, full, Body, ReplayBody};
pub use buffer::ResponseBuffer;
pub use error::{BoxError, Fault, FaultKind, HandlerResult, DEFAULT_FAULT_PLACEHOLDER};
pub use middleware::{handler_fn, BoxFuture, BoxedNext, LayerStack, MiddlewareLayer};
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use server::Server;
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};
