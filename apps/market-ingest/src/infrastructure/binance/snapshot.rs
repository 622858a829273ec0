//! Depth Snapshot Fetcher
//!
//! Periodically requests a full order book snapshot from the REST depth
//! endpoint and stores the response body verbatim. Runs in its own failure
//! domain: errors are logged and counted, never reported to the ingestion
//! error channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DepthSnapshot, SnapshotStore, StoreError};
use crate::domain::market::Symbol;
use crate::infrastructure::metrics;

/// Default REST depth endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.binance.com/api/v3/depth";

/// Errors from a single snapshot poll.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The request failed before a response arrived.
    #[error("snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("snapshot endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The snapshot could not be stored.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot fetcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Depth endpoint URL.
    pub endpoint: String,
    /// `limit` query parameter.
    pub limit: u32,
    /// Poll interval.
    pub interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REST_URL.to_string(),
            limit: 1000,
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Periodic REST depth snapshot poller.
pub struct SnapshotFetcher {
    client: reqwest::Client,
    config: SnapshotConfig,
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotFetcher {
    /// Create a fetcher writing to `store`.
    pub fn new(config: SnapshotConfig, store: Arc<dyn SnapshotStore>) -> Result<Self, SnapshotError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SnapshotError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config,
            store,
        })
    }

    /// Fetch one snapshot without storing it.
    pub async fn fetch(&self, symbol: &Symbol) -> Result<DepthSnapshot, SnapshotError> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("symbol", symbol.as_str().to_string()),
                ("limit", self.config.limit.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SnapshotError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?.to_vec();
        Ok(DepthSnapshot {
            symbol: symbol.clone(),
            fetched_at: chrono::Utc::now(),
            body,
        })
    }

    /// Fetch and store one snapshot.
    pub async fn poll_once(&self, symbol: &Symbol) -> Result<(), SnapshotError> {
        let snapshot = self.fetch(symbol).await?;
        self.store.store(&snapshot).await?;
        tracing::debug!(%symbol, bytes = snapshot.body.len(), "Depth snapshot stored");
        Ok(())
    }

    /// Poll every interval until `cancel` fires.
    ///
    /// The first poll happens one interval after start; missed ticks are
    /// skipped.
    pub async fn run(&self, symbol: Symbol, cancel: CancellationToken) {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            %symbol,
            interval_ms = period.as_millis(),
            "Snapshot fetcher started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => match self.poll_once(&symbol).await {
                    Ok(()) => metrics::record_snapshot_stored(),
                    Err(e) => {
                        metrics::record_snapshot_failure();
                        tracing::warn!(%symbol, error = %e, "Depth snapshot failed");
                    }
                },
            }
        }

        tracing::info!(%symbol, "Snapshot fetcher stopped");
    }
}
