//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Records**: Records inserted per stream, insert latency
//! - **Errors**: Parse, sink and source errors, dropped error reports,
//!   sequence regressions
//! - **Workers**: Active stream workers
//! - **Snapshots**: Snapshots stored and failed polls
//!
//! Recording before [`init_metrics`] is a no-op.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::market::StreamKind;

/// Insert latency buckets from 100us to 5s.
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Start the Prometheus HTTP listener on `0.0.0.0:{port}`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "market_ingest_records_inserted_total",
        "Records persisted by the storage sink"
    );
    describe_histogram!(
        "market_ingest_insert_duration_seconds",
        "Time spent in a single storage insert"
    );
    describe_counter!(
        "market_ingest_errors_total",
        "Per-record ingestion errors by cause"
    );
    describe_counter!(
        "market_ingest_error_reports_dropped_total",
        "Error reports dropped because the error channel was full"
    );
    describe_counter!(
        "market_ingest_sequence_regressions_total",
        "Events whose sequence went backwards within a stream"
    );
    describe_gauge!(
        "market_ingest_active_workers",
        "Stream workers currently running"
    );
    describe_counter!(
        "market_ingest_snapshots_stored_total",
        "Depth snapshots persisted"
    );
    describe_counter!(
        "market_ingest_snapshot_failures_total",
        "Depth snapshot polls that failed"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Error cause label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    /// Malformed numeric field.
    Parse,
    /// Storage insert failed.
    Sink,
    /// Source transport or decode failure.
    Source,
}

impl ErrorCause {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Sink => "sink",
            Self::Source => "source",
        }
    }
}

/// Record one successful insert and its latency.
pub fn record_insert(stream: StreamKind, duration: Duration) {
    counter!(
        "market_ingest_records_inserted_total",
        "stream" => stream.as_str()
    )
    .increment(1);
    histogram!(
        "market_ingest_insert_duration_seconds",
        "stream" => stream.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record a per-record ingestion error.
pub fn record_ingest_error(stream: StreamKind, cause: ErrorCause) {
    counter!(
        "market_ingest_errors_total",
        "stream" => stream.as_str(),
        "cause" => cause.as_str()
    )
    .increment(1);
}

/// Record an error report dropped on a full channel.
pub fn record_error_report_dropped() {
    counter!("market_ingest_error_reports_dropped_total").increment(1);
}

/// Record a sequence regression.
pub fn record_sequence_regression(stream: StreamKind) {
    counter!(
        "market_ingest_sequence_regressions_total",
        "stream" => stream.as_str()
    )
    .increment(1);
}

/// A worker started.
pub fn worker_started(stream: StreamKind) {
    gauge!("market_ingest_active_workers", "stream" => stream.as_str()).increment(1.0);
}

/// A worker exited.
pub fn worker_stopped(stream: StreamKind) {
    gauge!("market_ingest_active_workers", "stream" => stream.as_str()).decrement(1.0);
}

/// Record a stored snapshot.
pub fn record_snapshot_stored() {
    counter!("market_ingest_snapshots_stored_total").increment(1);
}

/// Record a failed snapshot poll.
pub fn record_snapshot_failure() {
    counter!("market_ingest_snapshot_failures_total").increment(1);
}
