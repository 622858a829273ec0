//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus configuration, logging and metrics.

/// Binance WebSocket stream source and REST snapshot fetcher.
pub mod binance;

/// TectonicDB storage sink and read-back client.
pub mod tectonic;

/// SQLite and in-memory sinks and snapshot stores.
pub mod persistence;

/// Caller-driven stream source for tests and dry runs.
pub mod scripted;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
