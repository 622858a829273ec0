//! Snapshot Store Port (Driven Port)
//!
//! Interface for keeping full order book snapshots as fetched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::market::Symbol;

/// A raw depth snapshot, stored byte-for-byte as the venue returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSnapshot {
    /// Symbol the snapshot was requested for.
    pub symbol: Symbol,
    /// Local capture time.
    pub fetched_at: DateTime<Utc>,
    /// Response body.
    pub body: Vec<u8>,
}

/// Snapshot store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or initialised.
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),

    /// The write failed.
    #[error("snapshot write failed: {0}")]
    Write(String),
}

/// Port for snapshot persistence.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store one snapshot.
    async fn store(&self, snapshot: &DepthSnapshot) -> Result<(), StoreError>;
}
