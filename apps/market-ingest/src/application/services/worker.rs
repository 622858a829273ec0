//! Stream Worker
//!
//! One worker owns one subscription for one (symbol, stream kind) pair. It
//! normalizes every inbound event, inserts the resulting records in arrival
//! order and reports per-record failures without stopping. Only source
//! closure or the shared cancellation token ends it.
//!
//! # Lifecycle
//!
//! ```text
//! start ──subscribe──► registered ──► run loop ──┬─ source closed ─────────► exit
//!   │                                            └─ cancelled ─► stop ─ack─► exit
//!   └─ subscribe failed ─► SetupError (never registered)
//! ```
//!
//! An insert already in flight is not interrupted by cancellation; the
//! worker observes cancellation before handling the next event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::barrier::{JoinBarrier, JoinSlot};
use super::reporting::{ErrorReporter, FailureCause, IngestError, SetupError};
use crate::application::ports::{SourceMessage, StorageSink, StreamSource, Subscription};
use crate::domain::market::{MarketEvent, StreamKind, Symbol};
use crate::domain::normalize::{normalize_depth, normalize_trade};
use crate::domain::record::NormalizedRecord;
use crate::infrastructure::metrics;

// =============================================================================
// Settings / Context
// =============================================================================

/// Tunables shared by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// How long a worker waits for its source to acknowledge a stop request.
    pub stop_ack_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            stop_ack_timeout: Duration::from_secs(5),
        }
    }
}

/// Handles every worker of a session shares.
#[derive(Clone)]
pub struct WorkerContext {
    /// Where subscriptions come from.
    pub source: Arc<dyn StreamSource>,
    /// Where records go.
    pub sink: Arc<dyn StorageSink>,
    /// Shared error channel.
    pub reporter: ErrorReporter,
    /// Shared cancellation token.
    pub cancel: CancellationToken,
    /// Shared join barrier.
    pub barrier: JoinBarrier,
    /// Worker tunables.
    pub settings: WorkerSettings,
}

// =============================================================================
// Worker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    SourceClosed,
    Cancelled,
    StopUnacknowledged,
}

impl WorkerExit {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SourceClosed => "source_closed",
            Self::Cancelled => "cancelled",
            Self::StopUnacknowledged => "stop_unacknowledged",
        }
    }
}

/// Consumer of one subscription.
pub struct StreamWorker {
    symbol: Symbol,
    kind: StreamKind,
    sink: Arc<dyn StorageSink>,
    reporter: ErrorReporter,
    settings: WorkerSettings,
    last_sequence: Option<u64>,
}

impl StreamWorker {
    /// Open the subscription and spawn the worker.
    ///
    /// The worker is registered with the join barrier only once the
    /// subscription is open. A failed open is returned here and never reaches
    /// the error channel.
    pub async fn start(
        ctx: &WorkerContext,
        symbol: Symbol,
        kind: StreamKind,
    ) -> Result<(), SetupError> {
        let subscription = ctx.source.subscribe(&symbol, kind).await.map_err(|source| {
            tracing::error!(%symbol, stream = %kind, error = %source, "Failed to open stream");
            SetupError::Subscribe {
                symbol: symbol.clone(),
                stream: kind,
                source,
            }
        })?;

        let slot = ctx.barrier.register();
        let worker = Self {
            symbol,
            kind,
            sink: Arc::clone(&ctx.sink),
            reporter: ctx.reporter.clone(),
            settings: ctx.settings,
            last_sequence: None,
        };
        tokio::spawn(worker.run(subscription, ctx.cancel.clone(), slot));
        Ok(())
    }

    async fn run(mut self, mut subscription: Subscription, cancel: CancellationToken, slot: JoinSlot) {
        metrics::worker_started(self.kind);
        tracing::info!(symbol = %self.symbol, stream = %self.kind, "Stream worker started");

        let exit = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break self.stop(&mut subscription).await,

                message = subscription.recv() => match message {
                    Some(SourceMessage::Event(event)) => self.handle_event(event).await,
                    Some(SourceMessage::Error(error)) => self.report(error),
                    None => break WorkerExit::SourceClosed,
                },
            }
        };

        metrics::worker_stopped(self.kind);
        tracing::info!(
            symbol = %self.symbol,
            stream = %self.kind,
            exit = exit.as_str(),
            "Stream worker exited"
        );
        drop(slot);
    }

    async fn stop(&self, subscription: &mut Subscription) -> WorkerExit {
        subscription.request_stop();
        if tokio::time::timeout(self.settings.stop_ack_timeout, subscription.stopped())
            .await
            .is_ok()
        {
            WorkerExit::Cancelled
        } else {
            tracing::warn!(
                symbol = %self.symbol,
                stream = %self.kind,
                timeout_ms = self.settings.stop_ack_timeout.as_millis(),
                "Source did not acknowledge stop, exiting anyway"
            );
            WorkerExit::StopUnacknowledged
        }
    }

    async fn handle_event(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::Depth(depth) => {
                self.observe_sequence(depth.first_update_id);
                let normalized = normalize_depth(&depth);
                for error in normalized.errors {
                    self.report(error);
                }
                for record in normalized.records {
                    self.persist(record).await;
                }
            }
            MarketEvent::Trade(trade) => {
                self.observe_sequence(trade.trade_id);
                match normalize_trade(&trade) {
                    Ok(record) => self.persist(record).await,
                    Err(error) => self.report(error),
                }
            }
        }
    }

    fn observe_sequence(&mut self, sequence: u64) {
        if let Some(last) = self.last_sequence
            && sequence < last
        {
            tracing::warn!(
                symbol = %self.symbol,
                stream = %self.kind,
                last,
                sequence,
                "Sequence regression"
            );
            metrics::record_sequence_regression(self.kind);
        }
        self.last_sequence = Some(sequence);
    }

    async fn persist(&self, record: NormalizedRecord) {
        let started = Instant::now();
        match self.sink.insert(&self.symbol, &record).await {
            Ok(()) => {
                metrics::record_insert(self.kind, started.elapsed());
                tracing::trace!(
                    symbol = %self.symbol,
                    stream = %self.kind,
                    sequence = record.sequence(),
                    "Record inserted"
                );
            }
            Err(error) => self.report(error),
        }
    }

    fn report(&self, cause: impl Into<FailureCause>) {
        self.reporter
            .report(IngestError::new(self.symbol.clone(), self.kind, cause));
    }
}
