//! TectonicDB Storage Sink
//!
//! TCP client for TectonicDB's line protocol.
//!
//! # Protocol
//!
//! Each command is one line of text. Every reply is framed as:
//!
//! ```text
//! ┌─────────┬──────────────────┬─────────────┐
//! │ success │ length (u64, BE) │ payload     │
//! │ 1 byte  │ 8 bytes          │ length bytes│
//! └─────────┴──────────────────┴─────────────┘
//! ```
//!
//! Records are written as
//! `ADD <ts>, <seq>, <is_trade>, <is_bid>, <price>, <size>; INTO <db>` with
//! the timestamp in seconds (millisecond fraction) and booleans as `t`/`f`.
//! Each symbol gets its own database, `<db_name>_<symbol>` (lowercase), so
//! sequences of different symbols never share a table.
//!
//! [`TectonicReader`] reuses the same connection handling to read a
//! symbol's database back with `INFO` and `GET n`.
//!
//! A single connection task owns the socket. Callers queue commands over a
//! channel and wait for a oneshot reply, bounded by the request timeout, so
//! no lock is held across the network round trip.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::application::ports::{SinkError, StorageSink};
use crate::domain::market::Symbol;
use crate::domain::record::NormalizedRecord;

/// Replies larger than this are treated as a broken connection.
const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;

/// Queued commands before callers start waiting.
const REQUEST_QUEUE: usize = 256;

/// TectonicDB connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TectonicConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Prefix of the per-symbol databases.
    pub db_name: String,
    /// Per-command timeout, also used for the initial connect.
    pub request_timeout: Duration,
}

impl Default for TectonicConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9002,
            db_name: "binance".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

struct Request {
    command: String,
    reply: oneshot::Sender<Result<String, SinkError>>,
}

/// Name of the database holding `symbol`'s records.
#[must_use]
pub fn symbol_db(db_name: &str, symbol: &Symbol) -> String {
    format!("{db_name}_{}", symbol.to_stream_name())
}

// =============================================================================
// Connection
// =============================================================================

/// Handle onto the connection task.
#[derive(Debug, Clone)]
struct Connection {
    requests: mpsc::Sender<Request>,
    request_timeout: Duration,
}

impl Connection {
    async fn open(config: &TectonicConfig) -> Result<Self, SinkError> {
        let addr = format!("{}:{}", config.host, config.port);
        tracing::info!(%addr, "Connecting to TectonicDB");

        let stream = tokio::time::timeout(config.request_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SinkError::Timeout(config.request_timeout))?
            .map_err(|e| SinkError::Connection {
                message: format!("{addr}: {e}"),
            })?;

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        tokio::spawn(run_connection(stream, rx));

        Ok(Self {
            requests: tx,
            request_timeout: config.request_timeout,
        })
    }

    async fn execute(&self, command: String) -> Result<String, SinkError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| SinkError::Closed)?;

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SinkError::Closed),
            Err(_) => Err(SinkError::Timeout(self.request_timeout)),
        }
    }

    /// Create `db` unless it exists, then select it.
    async fn prepare(&self, db: &str) -> Result<(), SinkError> {
        match self.execute(format!("CREATE {db}")).await {
            Ok(_) => tracing::info!(%db, "TectonicDB database created"),
            Err(SinkError::Rejected { message }) => {
                tracing::debug!(%db, %message, "CREATE refused, assuming database exists");
            }
            Err(e) => return Err(e),
        }
        self.execute(format!("USE {db}")).await.map(|_| ())
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Storage sink writing to TectonicDB, one database per symbol.
#[derive(Debug, Clone)]
pub struct TectonicSink {
    connection: Connection,
    databases: HashMap<Symbol, String>,
}

impl TectonicSink {
    /// Connect, then create (if needed) and select the database of every
    /// symbol that will be recorded.
    pub async fn connect(config: &TectonicConfig, symbols: &[Symbol]) -> Result<Self, SinkError> {
        let connection = Connection::open(config).await?;

        let mut databases = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let db = symbol_db(&config.db_name, symbol);
            connection.prepare(&db).await?;
            databases.insert(symbol.clone(), db);
        }

        Ok(Self {
            connection,
            databases,
        })
    }
}

#[async_trait]
impl StorageSink for TectonicSink {
    async fn insert(&self, symbol: &Symbol, record: &NormalizedRecord) -> Result<(), SinkError> {
        let db = self
            .databases
            .get(symbol)
            .ok_or_else(|| SinkError::Rejected {
                message: format!("no database prepared for {symbol}"),
            })?;
        self.connection
            .execute(add_command(record, db))
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Read-back
// =============================================================================

/// Read-only client for inspecting one symbol's database.
#[derive(Debug, Clone)]
pub struct TectonicReader {
    connection: Connection,
    db: String,
}

impl TectonicReader {
    /// Connect and select `symbol`'s database, which must already exist.
    pub async fn connect(config: &TectonicConfig, symbol: &Symbol) -> Result<Self, SinkError> {
        let connection = Connection::open(config).await?;
        let db = symbol_db(&config.db_name, symbol);
        connection.execute(format!("USE {db}")).await?;
        Ok(Self { connection, db })
    }

    /// Selected database.
    #[must_use]
    pub fn db(&self) -> &str {
        &self.db
    }

    /// Server summary as returned by `INFO`.
    pub async fn info(&self) -> Result<String, SinkError> {
        self.connection.execute("INFO".to_string()).await
    }

    /// The latest `count` records of the selected database, as JSON.
    pub async fn get(&self, count: u64) -> Result<String, SinkError> {
        self.connection
            .execute(format!("GET {count} AS JSON"))
            .await
    }
}

/// Render the `ADD` command for one record.
#[must_use]
pub fn add_command(record: &NormalizedRecord, db_name: &str) -> String {
    format!(
        "ADD {:.3}, {}, {}, {}, {}, {}; INTO {db_name}",
        record.timestamp() / 1000.0,
        record.sequence(),
        flag(record.is_trade()),
        flag(record.is_bid()),
        record.price(),
        record.size(),
    )
}

const fn flag(value: bool) -> &'static str {
    if value { "t" } else { "f" }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn run_connection(mut stream: TcpStream, mut requests: mpsc::Receiver<Request>) {
    while let Some(Request { command, reply }) = requests.recv().await {
        let result = round_trip(&mut stream, &command).await;
        let broken = matches!(result, Err(SinkError::Connection { .. }));
        let _ = reply.send(result);

        if broken {
            tracing::warn!("TectonicDB connection lost");
            break;
        }
    }
    tracing::debug!("TectonicDB connection task exited");
}

async fn round_trip(stream: &mut TcpStream, command: &str) -> Result<String, SinkError> {
    let io = |e: std::io::Error| SinkError::Connection {
        message: e.to_string(),
    };

    stream.write_all(command.as_bytes()).await.map_err(io)?;
    stream.write_all(b"\n").await.map_err(io)?;

    let success = stream.read_u8().await.map_err(io)? == 1;
    let raw_len = stream.read_u64().await.map_err(io)?;
    let len = usize::try_from(raw_len)
        .ok()
        .filter(|len| *len <= MAX_REPLY_BYTES)
        .ok_or_else(|| SinkError::Connection {
            message: format!("reply of {raw_len} bytes exceeds limit"),
        })?;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(io)?;
    let text = String::from_utf8_lossy(&payload).into_owned();

    if success {
        Ok(text)
    } else {
        Err(SinkError::Rejected { message: text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Side;
    use rust_decimal::Decimal;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn reply(stream: &mut tokio::net::tcp::OwnedWriteHalf, ok: bool, body: &str) {
        stream.write_u8(u8::from(ok)).await.unwrap();
        stream.write_u64(body.len() as u64).await.unwrap();
        stream.write_all(body.as_bytes()).await.unwrap();
    }

    fn answer(line: &str) -> (bool, &'static str) {
        if line.starts_with("CREATE") {
            (false, "ERR: db exists")
        } else if line == "INFO" {
            (true, r#"{"dbs":[{"name":"binance_ethbtc","size":1}]}"#)
        } else if line.starts_with("GET") {
            (true, r#"[{"ts":1.0,"seq":5}]"#)
        } else {
            (true, "1")
        }
    }

    /// Fake server: refuses CREATE, answers INFO and GET, echoes commands.
    async fn fake_server() -> (TectonicConfig, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let (read, mut write) = tcp.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let (ok, body) = answer(&line);
                let _ = seen_tx.send(line);
                reply(&mut write, ok, body).await;
            }
        });

        let config = TectonicConfig {
            host: "127.0.0.1".to_string(),
            port,
            db_name: "binance".to_string(),
            request_timeout: Duration::from_secs(2),
        };
        (config, seen_rx)
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::new(raw).unwrap()
    }

    #[test]
    fn add_command_uses_seconds_and_flags() {
        let bid = NormalizedRecord::book_delta(
            1000.0,
            5,
            Side::Bid,
            Decimal::new(1, 2),
            Decimal::new(20, 1),
        );
        assert_eq!(
            add_command(&bid, "binance_ethbtc"),
            "ADD 1.000, 5, f, t, 0.01, 2.0; INTO binance_ethbtc"
        );

        let trade = NormalizedRecord::trade(2250.0, 42, Decimal::new(3, 2), Decimal::from(4));
        assert_eq!(
            add_command(&trade, "binance_ethbtc"),
            "ADD 2.250, 42, t, f, 0.03, 4; INTO binance_ethbtc"
        );
    }

    #[test]
    fn symbol_db_is_prefixed_and_lowercase() {
        assert_eq!(symbol_db("binance", &symbol("ETHBTC")), "binance_ethbtc");
    }

    #[tokio::test]
    async fn each_symbol_writes_to_its_own_database() {
        let (config, mut seen) = fake_server().await;
        let eth = symbol("ETHBTC");
        let bnb = symbol("BNBBTC");

        let sink = TectonicSink::connect(&config, &[eth.clone(), bnb.clone()])
            .await
            .unwrap();
        let record = NormalizedRecord::book_delta(
            1000.0,
            5,
            Side::Ask,
            Decimal::new(2, 2),
            Decimal::new(15, 1),
        );
        sink.insert(&eth, &record).await.unwrap();
        sink.insert(&bnb, &record).await.unwrap();

        let mut commands = Vec::new();
        for _ in 0..6 {
            commands.push(seen.recv().await.unwrap());
        }
        assert_eq!(
            commands,
            vec![
                "CREATE binance_ethbtc",
                "USE binance_ethbtc",
                "CREATE binance_bnbbtc",
                "USE binance_bnbbtc",
                "ADD 1.000, 5, f, f, 0.02, 1.5; INTO binance_ethbtc",
                "ADD 1.000, 5, f, f, 0.02, 1.5; INTO binance_bnbbtc",
            ]
        );
    }

    #[tokio::test]
    async fn unprepared_symbol_is_rejected() {
        let (config, _seen) = fake_server().await;
        let sink = TectonicSink::connect(&config, &[symbol("ETHBTC")])
            .await
            .unwrap();

        let result = sink
            .insert(
                &symbol("BNBBTC"),
                &NormalizedRecord::trade(1.0, 1, Decimal::ONE, Decimal::ONE),
            )
            .await;
        assert!(matches!(result, Err(SinkError::Rejected { .. })));
    }

    #[tokio::test]
    async fn reader_selects_symbol_db_and_reads_back() {
        let (config, mut seen) = fake_server().await;

        let reader = TectonicReader::connect(&config, &symbol("ETHBTC"))
            .await
            .unwrap();
        assert_eq!(reader.db(), "binance_ethbtc");
        assert!(reader.info().await.unwrap().contains("binance_ethbtc"));
        assert_eq!(reader.get(13).await.unwrap(), r#"[{"ts":1.0,"seq":5}]"#);

        assert_eq!(seen.recv().await.unwrap(), "USE binance_ethbtc");
        assert_eq!(seen.recv().await.unwrap(), "INFO");
        assert_eq!(seen.recv().await.unwrap(), "GET 13 AS JSON");
    }

    #[tokio::test]
    async fn connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TectonicConfig {
            port,
            ..TectonicConfig::default()
        };
        assert!(matches!(
            TectonicSink::connect(&config, &[symbol("ETHBTC")]).await,
            Err(SinkError::Connection { .. })
        ));
    }
}
