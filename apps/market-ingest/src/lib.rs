#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Market Ingest - Binance Market Data Recorder
//!
//! Opens a depth stream and a trade stream per symbol, normalizes every
//! event into storage records and writes them to a storage sink. The first
//! ingestion error (or an operator signal) stops every stream and the
//! process exits once all workers have been joined.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and functions
//!   - `market`: Symbols, stream kinds, raw depth and trade events
//!   - `record`: The normalized storage record
//!   - `normalize`: Event → record conversion
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream source, storage sink and snapshot store interfaces
//!   - `services`: Stream worker, ingestion coordinator, shutdown controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket stream source and REST snapshot fetcher
//!   - `tectonic`: TectonicDB sink and read-back client
//!   - `persistence`: SQLite and in-memory sinks and snapshot stores
//!   - `config`, `telemetry`, `metrics`
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐  events  ┌──────────────┐  records  ┌─────────┐
//! depth WS ──────►│ Subscription │─────────►│ StreamWorker │──────────►│         │
//!                 └──────────────┘          └──────┬───────┘           │  Sink   │
//!                 ┌──────────────┐  events  ┌──────┴───────┐  records  │         │
//! trade WS ──────►│ Subscription │─────────►│ StreamWorker │──────────►│         │
//!                 └──────────────┘          └──────┬───────┘           └─────────┘
//!                                                  │ first error
//!                                                  ▼
//!                  Ctrl+C / SIGTERM ──────► ShutdownController ──► cancel + join
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market types and normalization with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    DepthEvent, MarketEvent, PriceLevel, Side, StreamKind, Symbol, TradeEvent,
};
pub use domain::normalize::{DepthNormalization, ParseError, normalize_depth, normalize_trade};
pub use domain::record::NormalizedRecord;

// Ports
pub use application::ports::{
    SinkError, SourceError, SourceMessage, StorageSink, StreamSource, Subscription,
    SubscriptionFeed,
};

// Services
pub use application::services::{
    IngestError, IngestionCoordinator, SetupError, ShutdownCause, ShutdownController,
    ShutdownOutcome, ShutdownState, WorkerSettings,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IngestConfig, StorageBackend};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
