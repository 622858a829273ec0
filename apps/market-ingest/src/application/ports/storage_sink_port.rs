//! Storage Sink Port (Driven Port)
//!
//! Interface for persisting normalized records one at a time.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::market::Symbol;
use crate::domain::record::NormalizedRecord;

/// Storage sink error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The backend could not be reached.
    #[error("storage connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The backend refused the record.
    #[error("storage rejected record: {message}")]
    Rejected {
        /// Error details.
        message: String,
    },

    /// The insert did not complete in time.
    #[error("storage insert timed out after {0:?}")]
    Timeout(Duration),

    /// The sink has shut down.
    #[error("storage sink closed")]
    Closed,
}

/// Port for single-record persistence.
///
/// Implementations are shared by every worker and must tolerate concurrent
/// calls. An insert is atomic: the record is either written or not.
/// Records of different symbols must stay distinguishable in storage;
/// sequences are only unique within one symbol's stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist one record of `symbol`.
    async fn insert(&self, symbol: &Symbol, record: &NormalizedRecord) -> Result<(), SinkError>;
}
