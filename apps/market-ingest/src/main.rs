//! Market Ingest Binary
//!
//! Records Binance depth and trade streams into a storage sink until
//! interrupted or until the first ingestion error. The `info` and `get`
//! subcommands read a symbol's TectonicDB database back.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-ingest
//! cargo run --bin market-ingest -- info --symbol ETHBTC
//! cargo run --bin market-ingest -- get --symbol ETHBTC --count 20
//! ```
//!
//! # Environment Variables
//!
//! - `SYMBOLS`: Comma-separated symbols (default: ETHBTC)
//! - `STORAGE_BACKEND`: tectonic | sqlite | memory (default: tectonic)
//! - `TECTONIC_IP` / `TECTONIC_PORT` / `TECTONIC_DB_NAME`: TectonicDB target
//!   (default: 127.0.0.1:9002, binance)
//! - `SQLITE_PATH`: SQLite file (default: market-ingest.db)
//! - `BINANCE_WS_URL` / `BINANCE_REST_URL`: Venue endpoints
//! - `SNAPSHOT_ENABLED`: Poll depth snapshots (default: true)
//! - `REQ_UPDATE_TIME`: Snapshot interval, e.g. `500ms`, `5s` (default: 5s)
//! - `METRICS_PORT`: Prometheus port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use market_ingest::application::ports::{SnapshotStore, StorageSink};
use market_ingest::infrastructure::binance::{BinanceStreamSource, SnapshotFetcher};
use market_ingest::infrastructure::persistence::{
    InMemorySink, InMemorySnapshotStore, SqliteSink, SqliteSnapshotStore, open_pool,
};
use market_ingest::infrastructure::tectonic::{TectonicReader, TectonicSink};
use market_ingest::{
    IngestConfig, IngestionCoordinator, SetupError, ShutdownCause, StorageBackend,
    StreamSource, Symbol, init_metrics, init_telemetry,
};
use sqlx::SqlitePool;
use tokio::signal;
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(name = "market-ingest")]
#[command(about = "Binance order book and trade stream recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record every configured symbol until interrupted (default)
    Run,
    /// Print TectonicDB server info for a symbol's database
    Info {
        /// Symbol whose database is selected
        #[arg(long, env = "READ_SYMBOL", value_parser = Symbol::new)]
        symbol: Symbol,
    },
    /// Print the latest records of a symbol's database as JSON
    Get {
        /// Symbol whose database is read
        #[arg(long, env = "READ_SYMBOL", value_parser = Symbol::new)]
        symbol: Symbol,

        /// Number of records to fetch
        #[arg(long, default_value_t = 10)]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    load_dotenv();

    let _telemetry_guard = init_telemetry()?;

    let config = IngestConfig::from_env()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Info { symbol } => {
            let reader = open_reader(&config, &symbol).await?;
            println!("{}", reader.info().await?);
            Ok(())
        }
        Command::Get { symbol, count } => {
            let reader = open_reader(&config, &symbol).await?;
            println!("{}", reader.get(count).await?);
            Ok(())
        }
    }
}

/// Record until a signal, the first ingestion error or the end of every stream.
async fn run(config: IngestConfig) -> anyhow::Result<()> {
    tracing::info!("Starting market ingest");
    log_config(&config);

    if config.metrics_port > 0 {
        init_metrics(config.metrics_port)?;
    }

    let mut pool = None;
    let sink = build_sink(&config, &mut pool).await?;
    let source: Arc<dyn StreamSource> = Arc::new(BinanceStreamSource::new(config.source.clone()));

    let coordinator = IngestionCoordinator::new(source, sink, config.worker);

    for symbol in &config.symbols {
        if let Err(e) = coordinator.process_symbol(symbol).await {
            coordinator.into_shutdown().abort().await;
            return Err(e).with_context(|| format!("starting {symbol}"));
        }
    }

    let mut snapshots = JoinSet::new();
    if config.snapshot.enabled {
        let store = build_snapshot_store(&config, pool).await?;
        let fetcher = Arc::new(SnapshotFetcher::new(config.snapshot.fetcher.clone(), store)?);
        for symbol in &config.symbols {
            let fetcher = Arc::clone(&fetcher);
            let symbol = symbol.clone();
            let cancel = coordinator.cancellation_token();
            snapshots.spawn(async move { fetcher.run(symbol, cancel).await });
        }
    }

    tracing::info!(
        symbols = config.symbols.len(),
        workers = coordinator.active_workers(),
        "Market ingest ready"
    );

    let outcome = coordinator.into_shutdown().run(await_shutdown()).await;

    while let Some(joined) = snapshots.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Snapshot task failed");
        }
    }

    tracing::info!(
        cause = outcome.cause.as_str(),
        ignored_errors = outcome.ignored_errors,
        "Market ingest stopped"
    );

    match outcome.cause {
        ShutdownCause::Error(error) => Err(error.into()),
        _ => Ok(()),
    }
}

/// Construct the configured storage sink.
///
/// The SQLite pool, when opened, is handed back for the snapshot store.
async fn build_sink(
    config: &IngestConfig,
    pool: &mut Option<SqlitePool>,
) -> anyhow::Result<Arc<dyn StorageSink>> {
    let sink: Arc<dyn StorageSink> = match config.backend {
        StorageBackend::Tectonic => Arc::new(
            TectonicSink::connect(&config.tectonic, &config.symbols)
                .await
                .map_err(SetupError::Sink)?,
        ),
        StorageBackend::Sqlite => {
            let opened = open_pool(&config.sqlite_path)
                .await
                .with_context(|| format!("opening {}", config.sqlite_path.display()))?;
            let sink = SqliteSink::from_pool(opened.clone())
                .await
                .map_err(SetupError::Sink)?;
            *pool = Some(opened);
            Arc::new(sink)
        }
        StorageBackend::Memory => {
            tracing::warn!("Memory backend selected; records are discarded on exit");
            Arc::new(InMemorySink::new())
        }
    };

    tracing::info!(backend = config.backend.as_str(), "Storage sink ready");
    Ok(sink)
}

/// Select a symbol's TectonicDB database for reading.
async fn open_reader(config: &IngestConfig, symbol: &Symbol) -> anyhow::Result<TectonicReader> {
    let reader = TectonicReader::connect(&config.tectonic, symbol)
        .await
        .with_context(|| {
            format!(
                "reading {symbol} from {}:{}",
                config.tectonic.host, config.tectonic.port
            )
        })?;
    tracing::debug!(db = reader.db(), "Reader ready");
    Ok(reader)
}

/// Construct the snapshot store, reusing the sink's SQLite pool if any.
async fn build_snapshot_store(
    config: &IngestConfig,
    pool: Option<SqlitePool>,
) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    if config.backend == StorageBackend::Memory {
        return Ok(Arc::new(InMemorySnapshotStore::new()));
    }

    let pool = match pool {
        Some(pool) => pool,
        None => open_pool(&config.sqlite_path)
            .await
            .with_context(|| format!("opening {}", config.sqlite_path.display()))?,
    };
    let store = SqliteSnapshotStore::from_pool(pool)
        .await
        .map_err(SetupError::SnapshotStore)?;
    Ok(Arc::new(store))
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    let symbols: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
    tracing::info!(
        symbols = ?symbols,
        backend = config.backend.as_str(),
        snapshots = config.snapshot.enabled,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.source.ws_url,
        rest_url = %config.snapshot.fetcher.endpoint,
        tectonic = %format!("{}:{}", config.tectonic.host, config.tectonic.port),
        "Endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
///
/// If a handler cannot be installed that signal is never observed; the
/// other one and the error channel still stop the session.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }
}
