//! Fault reporting

use crate::correlation::ExchangeId;
use exchange_audit_core::Fault;

/// Receives downstream faults for operational logging.
///
/// Called once per faulted exchange, before the record is emitted.
pub trait ErrorReporter: Send + Sync + 'static {
    /// Report a fault raised while serving `exchange_id`
    fn report(&self, exchange_id: &ExchangeId, fault: &Fault);
}

/// Logs faults at ERROR through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, exchange_id: &ExchangeId, fault: &Fault) {
        tracing::error!(
            correlation_id = %exchange_id,
            kind = %fault.kind(),
            error = %fault.message(),
            "exception: api trace record {}",
            exchange_id
        );
    }
}

impl<F> ErrorReporter for F
where
    F: Fn(&ExchangeId, &Fault) + Send + Sync + 'static,
{
    fn report(&self, exchange_id: &ExchangeId, fault: &Fault) {
        self(exchange_id, fault)
    }
}
