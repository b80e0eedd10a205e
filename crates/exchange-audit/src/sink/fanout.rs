//! Sink broadcasting to several sinks

use super::{AuditSink, EmitFuture, SinkError};
use crate::record::ExchangeRecord;
use std::sync::Arc;

/// Sends every record to each of its sinks, in order.
///
/// A failing sink does not stop the others. If any failed, the returned
/// error counts the failures and carries the first message.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with<S: AuditSink>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Number of sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sinks
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for FanoutSink {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        Box::pin(async move {
            let total = self.sinks.len();
            let mut failed = 0;
            let mut first = None;

            for sink in &self.sinks {
                if let Err(e) = sink.emit(record.clone()).await {
                    failed += 1;
                    first.get_or_insert_with(|| e.to_string());
                }
            }

            match first {
                None => Ok(()),
                Some(first) => Err(SinkError::Fanout {
                    failed,
                    total,
                    first,
                }),
            }
        })
    }
}
