//! In-memory sink and snapshot store for testing and dry runs.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{
    DepthSnapshot, SinkError, SnapshotStore, StorageSink, StoreError,
};
use crate::domain::market::Symbol;
use crate::domain::record::NormalizedRecord;

type RejectFn = Box<dyn Fn(&NormalizedRecord) -> bool + Send + Sync>;

/// In-memory implementation of `StorageSink`.
///
/// Keeps records in insert order, tagged with their symbol. Not for
/// production use.
#[derive(Default)]
pub struct InMemorySink {
    records: Mutex<Vec<(Symbol, NormalizedRecord)>>,
    reject: Option<RejectFn>,
}

impl fmt::Debug for InMemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySink")
            .field("records", &self.records.lock().len())
            .field("rejecting", &self.reject.is_some())
            .finish()
    }
}

impl InMemorySink {
    /// Create an empty sink that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that rejects records matching `predicate`.
    #[must_use]
    pub fn rejecting(predicate: impl Fn(&NormalizedRecord) -> bool + Send + Sync + 'static) -> Self {
        Self {
            records: Mutex::default(),
            reject: Some(Box::new(predicate)),
        }
    }

    /// Copy of every stored record, in insert order.
    #[must_use]
    pub fn records(&self) -> Vec<NormalizedRecord> {
        self.records
            .lock()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Copy of the records stored for `symbol`, in insert order.
    #[must_use]
    pub fn records_for(&self, symbol: &Symbol) -> Vec<NormalizedRecord> {
        self.records
            .lock()
            .iter()
            .filter(|(stored, _)| stored == symbol)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl StorageSink for InMemorySink {
    async fn insert(&self, symbol: &Symbol, record: &NormalizedRecord) -> Result<(), SinkError> {
        if self.reject.as_ref().is_some_and(|reject| reject(record)) {
            return Err(SinkError::Rejected {
                message: format!("{symbol} record at sequence {} refused", record.sequence()),
            });
        }
        self.records.lock().push((symbol.clone(), record.clone()));
        Ok(())
    }
}

/// In-memory implementation of `SnapshotStore`.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<Vec<DepthSnapshot>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored snapshot, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<DepthSnapshot> {
        self.snapshots.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn store(&self, snapshot: &DepthSnapshot) -> Result<(), StoreError> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Side;
    use rust_decimal::Decimal;

    fn bid(sequence: u64) -> NormalizedRecord {
        NormalizedRecord::book_delta(1.0, sequence, Side::Bid, Decimal::ONE, Decimal::ONE)
    }

    fn eth() -> Symbol {
        Symbol::new("ETHBTC").unwrap()
    }

    #[tokio::test]
    async fn keeps_insert_order() {
        let sink = InMemorySink::new();
        sink.insert(&eth(), &bid(2)).await.unwrap();
        sink.insert(&eth(), &bid(1)).await.unwrap();

        let sequences: Vec<u64> = sink.records().iter().map(NormalizedRecord::sequence).collect();
        assert_eq!(sequences, vec![2, 1]);
    }

    #[tokio::test]
    async fn same_sequence_on_two_symbols_stays_apart() {
        let sink = InMemorySink::new();
        let bnb = Symbol::new("BNBBTC").unwrap();
        sink.insert(&eth(), &bid(5)).await.unwrap();
        sink.insert(&bnb, &bid(5)).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records_for(&eth()), vec![bid(5)]);
        assert_eq!(sink.records_for(&bnb), vec![bid(5)]);
    }

    #[tokio::test]
    async fn rejection_predicate_refuses_matching_records() {
        let sink = InMemorySink::rejecting(|record| record.sequence() == 7);

        assert!(sink.insert(&eth(), &bid(7)).await.is_err());
        assert!(sink.insert(&eth(), &bid(8)).await.is_ok());
        assert_eq!(sink.len(), 1);
    }
}
