//! Shutdown Controller
//!
//! Drives the session through `Running -> Stopping -> Stopped`.
//!
//! While running it races the external stop signal against the first error
//! on the shared channel. Whichever fires first is logged as the cause, the
//! shared token is cancelled and the controller waits on the join barrier.
//! Errors that arrive while stopping are counted but change nothing. Each
//! error is logged once, by the reporter that queued it. Shutdown is cooperative: no worker is aborted.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::barrier::JoinBarrier;
use super::reporting::IngestError;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Controller state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Ingesting; waiting for a signal or the first error.
    Running,
    /// Cancellation broadcast; waiting for workers to exit.
    Stopping,
    /// Every worker has exited.
    Stopped,
}

/// Why the session stopped.
#[derive(Debug, Clone)]
pub enum ShutdownCause {
    /// The external stop signal fired.
    Signal,
    /// The first reported ingestion error.
    Error(IngestError),
    /// Every worker exited on its own.
    StreamsClosed,
    /// Starting a symbol failed.
    SetupFailed,
}

impl ShutdownCause {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Error(_) => "error",
            Self::StreamsClosed => "streams_closed",
            Self::SetupFailed => "setup_failed",
        }
    }
}

/// Result of a completed shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownOutcome {
    /// What triggered the shutdown.
    pub cause: ShutdownCause,
    /// Errors received after the trigger.
    pub ignored_errors: usize,
}

/// Races the stop signal against the first error, then joins all workers.
#[derive(Debug)]
pub struct ShutdownController {
    errors: mpsc::Receiver<IngestError>,
    cancel: CancellationToken,
    barrier: JoinBarrier,
    state: watch::Sender<ShutdownState>,
    progress_interval: Duration,
}

impl ShutdownController {
    pub(crate) fn new(
        errors: mpsc::Receiver<IngestError>,
        cancel: CancellationToken,
        barrier: JoinBarrier,
    ) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            errors,
            cancel,
            barrier,
            state,
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    /// Override how often shutdown progress is logged.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Run until `stop_signal` fires or the first error arrives, then stop.
    pub async fn run<F>(mut self, stop_signal: F) -> ShutdownOutcome
    where
        F: Future<Output = ()>,
    {
        let cause = tokio::select! {
            biased;

            () = stop_signal => ShutdownCause::Signal,

            first = self.errors.recv() => match first {
                Some(error) => ShutdownCause::Error(error),
                None => ShutdownCause::StreamsClosed,
            },
        };

        self.stop(cause).await
    }

    /// Stop immediately after a failed setup, joining workers already started.
    pub async fn abort(self) -> ShutdownOutcome {
        self.stop(ShutdownCause::SetupFailed).await
    }

    async fn stop(mut self, cause: ShutdownCause) -> ShutdownOutcome {
        // The triggering error was already logged when it was reported.
        tracing::info!(cause = cause.as_str(), "Shutting down");

        self.state.send_replace(ShutdownState::Stopping);
        self.cancel.cancel();

        let ignored_errors = self.drain_until_joined().await;

        self.state.send_replace(ShutdownState::Stopped);
        tracing::info!(
            cause = cause.as_str(),
            ignored_errors,
            "Ingestion stopped"
        );

        ShutdownOutcome {
            cause,
            ignored_errors,
        }
    }

    async fn drain_until_joined(&mut self) -> usize {
        let mut ignored = 0;
        let mut errors_open = true;

        let mut progress =
            tokio::time::interval_at(Instant::now() + self.progress_interval, self.progress_interval);
        progress.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let barrier = self.barrier.clone();
        let joined = barrier.wait();
        tokio::pin!(joined);

        loop {
            tokio::select! {
                () = &mut joined => break,

                late = self.errors.recv(), if errors_open => match late {
                    Some(_) => ignored += 1,
                    None => errors_open = false,
                },

                _ = progress.tick() => tracing::info!(
                    remaining = self.barrier.active(),
                    "Waiting for stream workers to exit"
                ),
            }
        }

        ignored
    }
}
