//! Non-blocking sink wrapper

use super::{AuditSink, EmitFuture, SinkError};
use crate::record::ExchangeRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queues records for a background task that feeds an inner sink.
///
/// `emit` only enqueues, so the request path never waits on the inner sink.
/// Inner-sink failures are logged by the background task. The task exits once
/// every clone of the `ChannelSink` has been dropped and the queue is empty;
/// awaiting its [`JoinHandle`] after that flushes everything that was queued.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExchangeRecord>,
}

impl ChannelSink {
    /// Start the background task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<S: AuditSink>(inner: S) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ExchangeRecord>();

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let exchange_id = record.exchange_id;
                if let Err(e) = inner.emit(record).await {
                    tracing::warn!(exchange_id = %exchange_id, error = %e, "background audit sink failed");
                }
            }
            tracing::debug!("audit channel closed");
        });

        (Self { tx }, handle)
    }

    /// Whether the background task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl AuditSink for ChannelSink {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        let result = self.tx.send(record).map_err(|_| SinkError::Closed);
        Box::pin(async move { result })
    }
}
