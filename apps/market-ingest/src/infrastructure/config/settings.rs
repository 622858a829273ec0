//! Ingestion Configuration Settings
//!
//! Configuration types for the recorder, loaded from environment variables.
//! Missing values fall back to defaults; present but malformed values are
//! errors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::application::services::WorkerSettings;
use crate::domain::market::Symbol;
use crate::infrastructure::binance::{BinanceSourceConfig, SnapshotConfig};
use crate::infrastructure::tectonic::TectonicConfig;

/// Where normalized records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// TectonicDB over TCP.
    #[default]
    Tectonic,
    /// Local SQLite file.
    Sqlite,
    /// Process memory (dry run).
    Memory,
}

impl StorageBackend {
    /// Get the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tectonic => "tectonic",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tectonic" => Ok(Self::Tectonic),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

/// Snapshot poller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    /// Run the poller at all.
    pub enabled: bool,
    /// Poller configuration.
    pub fetcher: SnapshotConfig,
}

/// Complete recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Symbols to record; each gets a depth and a trade worker.
    pub symbols: Vec<Symbol>,
    /// Record storage backend.
    pub backend: StorageBackend,
    /// TectonicDB connection.
    pub tectonic: TectonicConfig,
    /// SQLite file for the sqlite backend and snapshots.
    pub sqlite_path: PathBuf,
    /// Binance stream source.
    pub source: BinanceSourceConfig,
    /// Depth snapshot poller.
    pub snapshot: SnapshotSettings,
    /// Stream worker tunables.
    pub worker: WorkerSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let symbols = parse_symbols(env.get("SYMBOLS").as_deref().unwrap_or("ETHBTC"))?;

        let tectonic_defaults = TectonicConfig::default();
        let tectonic = TectonicConfig {
            host: env.get("TECTONIC_IP").unwrap_or(tectonic_defaults.host),
            port: env.parse("TECTONIC_PORT", tectonic_defaults.port)?,
            db_name: env.get("TECTONIC_DB_NAME").unwrap_or(tectonic_defaults.db_name),
            request_timeout: env.duration_secs(
                "SINK_REQUEST_TIMEOUT_SECS",
                tectonic_defaults.request_timeout,
            )?,
        };

        let source_defaults = BinanceSourceConfig::default();
        let source = BinanceSourceConfig {
            ws_url: env.get("BINANCE_WS_URL").unwrap_or(source_defaults.ws_url),
            event_buffer: env.positive("EVENT_BUFFER", source_defaults.event_buffer)?,
        };

        let snapshot_defaults = SnapshotConfig::default();
        let snapshot = SnapshotSettings {
            enabled: env.flag("SNAPSHOT_ENABLED", true)?,
            fetcher: SnapshotConfig {
                endpoint: env.get("BINANCE_REST_URL").unwrap_or(snapshot_defaults.endpoint),
                limit: env.parse("SNAPSHOT_LIMIT", snapshot_defaults.limit)?,
                interval: env.duration("REQ_UPDATE_TIME", snapshot_defaults.interval)?,
                request_timeout: snapshot_defaults.request_timeout,
            },
        };

        let worker = WorkerSettings {
            stop_ack_timeout: env.duration_secs(
                "STOP_ACK_TIMEOUT_SECS",
                WorkerSettings::default().stop_ack_timeout,
            )?,
        };

        Ok(Self {
            symbols,
            backend: env.parse("STORAGE_BACKEND", StorageBackend::default())?,
            tectonic,
            sqlite_path: env
                .get("SQLITE_PATH")
                .map_or_else(|| PathBuf::from("market-ingest.db"), PathBuf::from),
            source,
            snapshot,
            worker,
            metrics_port: env.parse("METRICS_PORT", 0)?,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Environment variable has no usable content.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

// =============================================================================
// Parsing
// =============================================================================

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |value| {
            value.parse().map_err(|e: T::Err| invalid(key, &value, e))
        })
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(invalid(key, "0", "must be greater than zero")),
            n => Ok(n),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.get(key).map_or(Ok(default), |value| {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(key, &value, "expected true or false")),
            }
        })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |value| match value.parse::<u64>() {
            Ok(0) => Err(invalid(key, &value, "must be greater than zero")),
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(e) => Err(invalid(key, &value, e)),
        })
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |value| {
            parse_duration(&value).map_err(|reason| invalid(key, &value, reason))
        })
    }
}

fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_symbols(raw: &str) -> Result<Vec<Symbol>, ConfigError> {
    let symbols: Vec<Symbol> = raw
        .split(',')
        .filter_map(|s| Symbol::new(s).ok())
        .collect();
    if symbols.is_empty() {
        return Err(ConfigError::EmptyValue("SYMBOLS".to_string()));
    }
    Ok(symbols)
}

/// Parse a positive duration with a unit suffix: `ms`, `s`, `m` or `h`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "missing unit (ms, s, m, h)".to_string())?;
    let (number, unit) = raw.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid number {number:?}"))?;
    if value == 0 {
        return Err("must be greater than zero".to_string());
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        other => Err(format!("unknown unit {other:?}")),
    }
}
