//! In-memory sink

use super::{AuditSink, EmitFuture, SinkError, SinkResult};
use crate::correlation::ExchangeId;
use crate::record::ExchangeRecord;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// Default number of records kept by [`MemorySink::new`].
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded in-memory record store (for development/testing).
///
/// When full, the oldest record is evicted. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemorySink {
    records: Arc<RwLock<VecDeque<ExchangeRecord>>>,
    capacity: usize,
}

impl MemorySink {
    /// Create a sink keeping up to [`DEFAULT_CAPACITY`] records
    pub fn new() -> Self {
        Self::bounded(DEFAULT_CAPACITY)
    }

    /// Create a sink keeping up to `capacity` records (at least one)
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1000)))),
            capacity,
        }
    }

    /// Store a record, evicting the oldest if full
    pub fn push(&self, record: ExchangeRecord) -> SinkResult {
        let mut records = self
            .records
            .write()
            .map_err(|e| SinkError::Write(format!("Failed to acquire lock: {}", e)))?;

        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    /// Snapshot of stored records, oldest first
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.records
            .read()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Find a record by exchange id
    pub fn get(&self, id: &ExchangeId) -> Option<ExchangeRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.iter().find(|r| r.exchange_id == *id).cloned())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored record
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, record: ExchangeRecord) -> EmitFuture<'_> {
        let result = self.push(record);
        Box::pin(async move { result })
    }
}
