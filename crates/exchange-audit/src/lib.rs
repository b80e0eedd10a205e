//! # exchange-audit
//!
//! Audit capture for HTTP exchanges. [`AuditLayer`] sits in the request
//! pipeline and produces one [`ExchangeRecord`] per request/response pair:
//! method, origin, query string, sanitized headers, both bodies, status,
//! timings, correlation id and actor. The caller and downstream handlers see
//! exactly the bytes they would have seen without it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exchange_audit::{logging, AuditConfig, AuditLayer, ChannelSink, TracingSink};
//! use exchange_audit_core::{handler_fn, IntoResponse, LayerStack, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     logging::init(logging::LogFormat::Compact);
//!
//!     let (sink, _worker) = ChannelSink::spawn(TracingSink::new());
//!     let mut layers = LayerStack::new();
//!     layers.push(Box::new(AuditLayer::new(AuditConfig::from_env()?, sink)));
//!
//!     let handler = handler_fn(|_req| async { Ok("ok".into_response()) });
//!     Server::new(layers, handler).run("127.0.0.1:8080").await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`capture`]: non-destructive request/response body capture
//! - [`correlation`]: correlation carrier lookup and [`ExchangeId`]
//! - [`identity`]: actor resolution from an authenticated [`Principal`]
//! - [`record`]: [`ExchangeRecord`] and its builder
//! - [`sink`]: [`AuditSink`] and the provided sinks
//! - [`reporter`]: [`ErrorReporter`] for downstream faults
//! - [`config`]: [`AuditConfig`]
//! - [`logging`]: subscriber bootstrap

pub mod capture;
pub mod config;
pub mod correlation;
pub mod identity;
pub mod interceptor;
pub mod logging;
pub mod record;
pub mod reporter;
pub mod sink;

pub use config::{AuditConfig, AuditConfigBuilder, ConfigError};
pub use correlation::{CorrelationResolver, ExchangeId};
pub use identity::{ClaimsIdentity, IdentitySource, Principal};
pub use interceptor::{AuditLayer, CapturedRequestBody};
pub use record::{ExchangeRecord, Outcome, RecordBuilder, RequestFacts, ResponseFacts};
pub use reporter::{ErrorReporter, TracingErrorReporter};
pub use sink::{
    AuditSink, ChannelSink, EmitFuture, FanoutSink, FileSink, FileSinkConfig, MemorySink,
    SinkError, SinkResult, TracingSink,
};
