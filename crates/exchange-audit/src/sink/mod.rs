//! Audit sinks
//!
//! A sink receives each finished [`ExchangeRecord`] exactly once. Failures
//! are reported back to the interceptor, which logs them and carries on: a
//! sink can never change what the caller receives.
//!
//! | Sink | Use |
//! |------|-----|
//! | [`TracingSink`] | Writes `api trace record <id> <json>` through `tracing` |
//! | [`MemorySink`] | Bounded in-memory store, for inspection and tests |
//! | [`FileSink`] | JSON Lines file with size-based rotation |
//! | [`ChannelSink`] | Hands records to a background task feeding another sink |
//! | [`FanoutSink`] | Sends every record to several sinks |

mod channel;
mod fanout;
mod file;
mod memory;
mod tracing_sink;

pub use channel::ChannelSink;
pub use fanout::FanoutSink;
pub use file::{FileSink, FileSinkConfig};
pub use memory::MemorySink;
pub use tracing_sink::TracingSink;

use crate::record::ExchangeRecord;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result type for sink operations.
pub type SinkResult<T = ()> = Result<T, SinkError>;

/// Future returned by [`AuditSink::emit`].
pub type EmitFuture<'a> = Pin<Box<dyn Future<Output = SinkResult> + Send + 'a>>;

/// Errors a sink can report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The record could not be written.
    #[error("Failed to write exchange record: {0}")]
    Write(String),

    /// The record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink no longer accepts records.
    #[error("Audit sink is closed")]
    Closed,

    /// Some sinks of a fan-out failed.
    #[error("{failed} of {total} sinks failed: {first}")]
    Fanout {
        failed: usize,
        total: usize,
        first: String,
    },
}

/// Destination for finished exchange records.
pub trait AuditSink: Send + Sync + 'static {
    /// Accept one record. The record is moved; the sink owns it from here.
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_>;
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        (**self).emit(record)
    }
}

impl<S: AuditSink + ?Sized> AuditSink for Box<S> {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        (**self).emit(record)
    }
}
