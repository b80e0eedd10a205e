//! Sink writing records to the `tracing` pipeline

use super::{AuditSink, EmitFuture, SinkError};
use crate::record::ExchangeRecord;

/// Target used for every record event.
pub const TRACE_TARGET: &str = "exchange_audit::record";

/// Emits each record as one INFO event.
///
/// The message reads `api trace record <id> <json>` and the event carries a
/// `correlation_id` field, so both line-oriented and structured subscribers
/// can pick it up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a tracing sink
    pub fn new() -> Self {
        Self
    }

    /// The message logged for `record`
    pub fn render(record: &ExchangeRecord) -> Result<String, SinkError> {
        let json = serde_json::to_string(record)?;
        Ok(format!("api trace record {} {}", record.exchange_id, json))
    }
}

impl AuditSink for TracingSink {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        let result = Self::render(&record).map(|line| {
            tracing::info!(
                target: TRACE_TARGET,
                correlation_id = %record.exchange_id,
                "{}",
                line
            );
        });
        Box::pin(async move { result })
    }
}
