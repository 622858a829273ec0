//! Ingestion Coordinator
//!
//! Owns one ingestion session: the shared cancellation token, the join
//! barrier and the single-slot error channel. `process_symbol` starts the
//! depth worker then the trade worker for a symbol and returns without
//! waiting for them; the session is then handed to the
//! [`ShutdownController`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::barrier::JoinBarrier;
use super::reporting::{ErrorReporter, IngestError, SetupError};
use super::shutdown::ShutdownController;
use super::worker::{StreamWorker, WorkerContext, WorkerSettings};
use crate::application::ports::{StorageSink, StreamSource};
use crate::domain::market::{StreamKind, Symbol};

/// Starts stream workers and owns the session they share.
pub struct IngestionCoordinator {
    ctx: WorkerContext,
    errors: mpsc::Receiver<IngestError>,
}

impl IngestionCoordinator {
    /// Create a coordinator with a fresh session.
    #[must_use]
    pub fn new(
        source: Arc<dyn StreamSource>,
        sink: Arc<dyn StorageSink>,
        settings: WorkerSettings,
    ) -> Self {
        let (reporter, errors) = ErrorReporter::channel();
        Self {
            ctx: WorkerContext {
                source,
                sink,
                reporter,
                cancel: CancellationToken::new(),
                barrier: JoinBarrier::new(),
                settings,
            },
            errors,
        }
    }

    /// Start the depth and trade workers for `symbol`.
    ///
    /// Fails fast: if the depth stream cannot be opened the trade stream is
    /// not attempted. Workers already started keep running and are joined
    /// by the shutdown controller.
    pub async fn process_symbol(&self, symbol: &Symbol) -> Result<(), SetupError> {
        for kind in StreamKind::ALL {
            StreamWorker::start(&self.ctx, symbol.clone(), kind).await?;
        }
        tracing::info!(%symbol, "Ingestion started");
        Ok(())
    }

    /// Token cancelled when the session shuts down.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Number of running workers.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.ctx.barrier.active()
    }

    /// Hand the session to a shutdown controller.
    ///
    /// The coordinator's own reporter handle is released so the error channel
    /// closes once every worker has exited.
    #[must_use]
    pub fn into_shutdown(self) -> ShutdownController {
        let WorkerContext { cancel, barrier, .. } = self.ctx;
        ShutdownController::new(self.errors, cancel, barrier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemorySink;
    use crate::infrastructure::scripted::ScriptedStreamSource;

    fn symbol() -> Symbol {
        Symbol::new("ETHBTC").unwrap()
    }

    fn coordinator(source: &Arc<ScriptedStreamSource>) -> IngestionCoordinator {
        IngestionCoordinator::new(
            Arc::clone(source) as Arc<dyn StreamSource>,
            Arc::new(InMemorySink::new()),
            WorkerSettings::default(),
        )
    }

    #[tokio::test]
    async fn starts_depth_then_trade() {
        let source = Arc::new(ScriptedStreamSource::new());
        let coordinator = coordinator(&source);

        coordinator.process_symbol(&symbol()).await.unwrap();

        assert_eq!(
            source.subscriptions(),
            vec![
                (symbol(), StreamKind::Depth),
                (symbol(), StreamKind::Trade)
            ]
        );
        assert_eq!(coordinator.active_workers(), 2);
        coordinator.cancellation_token().cancel();
    }

    #[tokio::test]
    async fn depth_failure_skips_trade() {
        let source = Arc::new(ScriptedStreamSource::new());
        source.fail_on(&symbol(), StreamKind::Depth);
        let coordinator = coordinator(&source);

        let err = coordinator.process_symbol(&symbol()).await.unwrap_err();

        assert!(matches!(
            err,
            SetupError::Subscribe {
                stream: StreamKind::Depth,
                ..
            }
        ));
        assert_eq!(source.subscriptions(), vec![(symbol(), StreamKind::Depth)]);
        assert_eq!(coordinator.active_workers(), 0);
    }

    #[tokio::test]
    async fn trade_failure_leaves_depth_worker_running() {
        let source = Arc::new(ScriptedStreamSource::new());
        source.fail_on(&symbol(), StreamKind::Trade);
        let coordinator = coordinator(&source);

        assert!(coordinator.process_symbol(&symbol()).await.is_err());
        assert_eq!(coordinator.active_workers(), 1);
        coordinator.cancellation_token().cancel();
    }
}
