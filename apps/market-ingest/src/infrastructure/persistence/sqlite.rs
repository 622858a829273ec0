//! SQLite sink and snapshot store.
//!
//! Both share one pool. Tables are created on open if missing; no other
//! schema management is done.

use std::path::Path;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use crate::application::ports::{
    DepthSnapshot, SinkError, SnapshotStore, StorageSink, StoreError,
};
use crate::domain::market::Symbol;
use crate::domain::record::NormalizedRecord;

const CREATE_RECORDS: &str = "CREATE TABLE IF NOT EXISTS market_records (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    symbol TEXT NOT NULL, \
    timestamp REAL NOT NULL, \
    sequence INTEGER NOT NULL, \
    is_trade INTEGER NOT NULL, \
    side TEXT, \
    price TEXT NOT NULL, \
    size TEXT NOT NULL)";

const INDEX_RECORDS: &str =
    "CREATE INDEX IF NOT EXISTS market_records_symbol_sequence ON market_records (symbol, sequence)";

const CREATE_SNAPSHOTS: &str = "CREATE TABLE IF NOT EXISTS depth_snapshots (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    symbol TEXT NOT NULL, \
    fetched_at TEXT NOT NULL, \
    body BLOB NOT NULL)";

/// Open (creating if missing) the SQLite file at `path`.
pub async fn open_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePool::connect_with(options).await
}

// =============================================================================
// Sink
// =============================================================================

/// SQLite implementation of `StorageSink`.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Use an existing pool, creating the records table if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SinkError> {
        for statement in [CREATE_RECORDS, INDEX_RECORDS] {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| SinkError::Connection {
                    message: e.to_string(),
                })?;
        }
        Ok(Self { pool })
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StorageSink for SqliteSink {
    async fn insert(&self, symbol: &Symbol, record: &NormalizedRecord) -> Result<(), SinkError> {
        let sequence = i64::try_from(record.sequence()).map_err(|_| SinkError::Rejected {
            message: format!("sequence {} exceeds INTEGER range", record.sequence()),
        })?;

        sqlx::query(
            "INSERT INTO market_records (symbol, timestamp, sequence, is_trade, side, price, size) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(symbol.as_str())
        .bind(record.timestamp())
        .bind(sequence)
        .bind(record.is_trade())
        .bind(record.side().map(|side| side.as_str()))
        .bind(record.price().to_string())
        .bind(record.size().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Rejected {
            message: e.to_string(),
        })?;

        Ok(())
    }
}

// =============================================================================
// Snapshot Store
// =============================================================================

/// SQLite implementation of `SnapshotStore`.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Use an existing pool, creating the snapshots table if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_SNAPSHOTS)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn store(&self, snapshot: &DepthSnapshot) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO depth_snapshots (symbol, fetched_at, body) VALUES (?, ?, ?)")
            .bind(snapshot.symbol.as_str())
            .bind(snapshot.fetched_at.to_rfc3339())
            .bind(snapshot.body.as_slice())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }
}
