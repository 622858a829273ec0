//! Error Reporting
//!
//! Per-record failures never stop a worker. They are logged once and then
//! offered to a single-slot channel read by the shutdown controller. The send
//! is non-blocking: when the slot is taken the report is dropped, so a slow
//! consumer cannot stall ingestion. First error wins; later errors may be
//! lost.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::application::ports::{SinkError, SourceError, StoreError};
use crate::domain::market::{StreamKind, Symbol};
use crate::domain::normalize::ParseError;
use crate::infrastructure::metrics::{self, ErrorCause};

/// Capacity of the shared error channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 1;

// =============================================================================
// Errors
// =============================================================================

/// A recoverable per-record failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailureCause {
    /// Malformed numeric field; the entry was skipped.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Insert failed; the record was dropped.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The source reported a transport or decode problem.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl FailureCause {
    const fn metric_label(&self) -> ErrorCause {
        match self {
            Self::Parse(_) => ErrorCause::Parse,
            Self::Sink(_) => ErrorCause::Sink,
            Self::Source(_) => ErrorCause::Source,
        }
    }
}

/// A failure reported by one stream worker.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{symbol} {stream} stream: {cause}")]
pub struct IngestError {
    /// Symbol of the failing worker.
    pub symbol: Symbol,
    /// Stream of the failing worker.
    pub stream: StreamKind,
    /// What went wrong.
    #[source]
    pub cause: FailureCause,
}

impl IngestError {
    /// Attach worker context to a failure.
    pub fn new(symbol: Symbol, stream: StreamKind, cause: impl Into<FailureCause>) -> Self {
        Self {
            symbol,
            stream,
            cause: cause.into(),
        }
    }
}

/// Fatal failure while setting up ingestion.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A subscription could not be opened.
    #[error("cannot open {stream} stream for {symbol}: {source}")]
    Subscribe {
        /// Symbol requested.
        symbol: Symbol,
        /// Stream requested.
        stream: StreamKind,
        /// Source failure.
        source: SourceError,
    },

    /// The storage sink could not be constructed.
    #[error("storage sink unavailable: {0}")]
    Sink(#[source] SinkError),

    /// The snapshot store could not be constructed.
    #[error("snapshot store unavailable: {0}")]
    SnapshotStore(#[source] StoreError),
}

// =============================================================================
// Reporter
// =============================================================================

/// Cloneable, non-blocking handle onto the shared error channel.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<IngestError>,
}

impl ErrorReporter {
    /// Create a reporter and the receiving end of a single-slot channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<IngestError>) {
        let (tx, rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Log and offer an error without waiting.
    ///
    /// Returns `true` if the report was queued.
    pub fn report(&self, error: IngestError) -> bool {
        tracing::warn!(
            symbol = %error.symbol,
            stream = %error.stream,
            cause = %error.cause,
            "Ingestion error"
        );
        metrics::record_ingest_error(error.stream, error.cause.metric_label());

        match self.tx.try_send(error) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!(
                    symbol = %dropped.symbol,
                    stream = %dropped.stream,
                    "Error channel full, report dropped"
                );
                metrics::record_error_report_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
