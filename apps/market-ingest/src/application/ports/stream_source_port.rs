//! Stream Source Port (Driven Port)
//!
//! Interface for opening live market data subscriptions.
//!
//! A subscription is a message-passing pair: the source side holds a
//! [`SubscriptionFeed`] and pushes [`SourceMessage`]s, the worker side holds
//! the [`Subscription`] and consumes them in a loop. Channel closure is the
//! source's "closed" notification; dropping the feed also fires the "done"
//! acknowledgement the worker waits on after a stop request.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::domain::market::{MarketEvent, StreamKind, Symbol};

// =============================================================================
// Errors
// =============================================================================

/// Stream source error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The subscription could not be opened.
    #[error("failed to open {stream} stream: {message}")]
    Connect {
        /// Stream path that was requested.
        stream: String,
        /// Error details.
        message: String,
    },

    /// A frame could not be decoded.
    #[error("failed to decode message: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The transport failed mid-stream.
    #[error("transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },
}

/// What a subscription delivers.
#[derive(Debug, Clone)]
pub enum SourceMessage {
    /// A decoded market event.
    Event(MarketEvent),
    /// A non-terminal source failure.
    Error(SourceError),
}

// =============================================================================
// Subscription
// =============================================================================

/// Worker side of one open stream.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<SourceMessage>,
    stop: CancellationToken,
    done: CancellationToken,
}

impl Subscription {
    /// Create a connected subscription/feed pair with a bounded buffer.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, SubscriptionFeed) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = CancellationToken::new();
        let done = CancellationToken::new();

        let feed = SubscriptionFeed {
            tx,
            stop: stop.clone(),
            _done: done.clone().drop_guard(),
        };
        let subscription = Self {
            events: rx,
            stop,
            done,
        };
        (subscription, feed)
    }

    /// Next message, or `None` once the source has closed the stream.
    pub async fn recv(&mut self) -> Option<SourceMessage> {
        self.events.recv().await
    }

    /// Ask the source to stop. Idempotent.
    ///
    /// Buffered messages are no longer accepted after this call.
    pub fn request_stop(&mut self) {
        self.stop.cancel();
        self.events.close();
    }

    /// Resolves once the source side has released the stream.
    pub async fn stopped(&self) {
        self.done.cancelled().await;
    }

    /// True once the source side has released the stream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }
}

/// Source side of one open stream.
///
/// Dropping the feed closes the channel and acknowledges any stop request.
#[derive(Debug)]
pub struct SubscriptionFeed {
    tx: mpsc::Sender<SourceMessage>,
    stop: CancellationToken,
    _done: DropGuard,
}

impl SubscriptionFeed {
    /// Deliver a message, waiting for buffer space.
    ///
    /// Returns `false` when the worker has stopped listening, in which case
    /// the producer should wind down.
    pub async fn publish(&self, message: SourceMessage) -> bool {
        tokio::select! {
            biased;
            () = self.stop.cancelled() => false,
            sent = self.tx.send(message) => sent.is_ok(),
        }
    }

    /// Resolves when the worker requests a stop.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// True once the worker has requested a stop.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}

// =============================================================================
// Port
// =============================================================================

/// Port for live market data streams.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open one subscription.
    ///
    /// A returned error means nothing was opened; no feed task is left
    /// running.
    async fn subscribe(&self, symbol: &Symbol, kind: StreamKind)
    -> Result<Subscription, SourceError>;
}
