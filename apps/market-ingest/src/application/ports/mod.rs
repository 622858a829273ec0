//! Application Ports (Driven)
//!
//! Interfaces the ingestion services consume:
//! - `StreamSource`: opens one live subscription per (symbol, stream kind)
//! - `StorageSink`: persists a single normalized record
//! - `SnapshotStore`: keeps raw order book snapshots verbatim

mod snapshot_store_port;
mod storage_sink_port;
mod stream_source_port;

pub use snapshot_store_port::{DepthSnapshot, SnapshotStore, StoreError};
#[cfg(test)]
pub use storage_sink_port::MockStorageSink;
pub use storage_sink_port::{SinkError, StorageSink};
pub use stream_source_port::{
    SourceError, SourceMessage, StreamSource, Subscription, SubscriptionFeed,
};
