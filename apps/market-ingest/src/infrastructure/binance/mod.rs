//! Binance Adapters
//!
//! - `source`: raw WebSocket depth and trade streams
//! - `snapshot`: periodic REST depth snapshots
//! - `messages`: wire formats

pub mod messages;
pub mod snapshot;
pub mod source;

pub use snapshot::{SnapshotConfig, SnapshotError, SnapshotFetcher};
pub use source::{BinanceSourceConfig, BinanceStreamSource};
