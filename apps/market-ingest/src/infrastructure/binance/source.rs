//! Binance WebSocket Stream Source
//!
//! Opens one raw stream connection per subscription.
//!
//! # Stream URL
//!
//! `{base}/{symbol_lower}@depth` or `{base}/{symbol_lower}@trade`, with
//! `base` defaulting to `wss://stream.binance.com:9443/ws`.
//!
//! A failed connect is returned from `subscribe`. Once connected, a reader
//! task forwards decoded events, reports undecodable frames as source errors,
//! answers pings and ends on close frame, transport error or stop request.
//! There is no reconnect.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::messages::decode;
use crate::application::ports::{
    SourceError, SourceMessage, StreamSource, Subscription, SubscriptionFeed,
};
use crate::domain::market::{StreamKind, Symbol};

/// Default raw stream base URL.
pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Configuration for the Binance stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceSourceConfig {
    /// Base WebSocket URL; the stream name is appended.
    pub ws_url: String,
    /// Per-subscription event buffer.
    pub event_buffer: usize,
}

impl Default for BinanceSourceConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            event_buffer: 1024,
        }
    }
}

/// Stream source backed by Binance raw WebSocket streams.
#[derive(Debug, Clone)]
pub struct BinanceStreamSource {
    config: BinanceSourceConfig,
}

impl BinanceStreamSource {
    /// Create a new source.
    #[must_use]
    pub const fn new(config: BinanceSourceConfig) -> Self {
        Self { config }
    }

    fn stream_url(&self, stream: &str) -> String {
        format!("{}/{stream}", self.config.ws_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl StreamSource for BinanceStreamSource {
    async fn subscribe(
        &self,
        symbol: &Symbol,
        kind: StreamKind,
    ) -> Result<Subscription, SourceError> {
        let stream = format!("{}@{kind}", symbol.to_stream_name());
        let url = self.stream_url(&stream);
        tracing::info!(%url, "Connecting to Binance stream");

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SourceError::Connect {
                stream: stream.clone(),
                message: e.to_string(),
            })?;

        let (subscription, feed) = Subscription::channel(self.config.event_buffer);
        tokio::spawn(read_stream(ws, feed, kind, stream));
        Ok(subscription)
    }
}

async fn read_stream(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    feed: SubscriptionFeed,
    kind: StreamKind,
    stream: String,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            biased;

            () = feed.stopped() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(%stream, error = %e, "Close frame not sent");
                }
                tracing::info!(%stream, "Stream stopped");
                break;
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message = match decode(kind, &text) {
                        Ok(event) => SourceMessage::Event(event),
                        Err(e) => SourceMessage::Error(SourceError::Decode {
                            message: e.to_string(),
                        }),
                    };
                    // A refused publish means stop was requested; the next
                    // iteration takes the stop branch.
                    feed.publish(message).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        report_transport(&feed, &stream, &e).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(%stream, ?frame, "Server sent close frame");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report_transport(&feed, &stream, &e).await;
                    break;
                }
                None => {
                    tracing::info!(%stream, "WebSocket stream ended");
                    break;
                }
            },
        }
    }
}

async fn report_transport(feed: &SubscriptionFeed, stream: &str, error: &impl std::fmt::Display) {
    tracing::warn!(%stream, error = %error, "WebSocket transport error");
    feed.publish(SourceMessage::Error(SourceError::Transport {
        message: error.to_string(),
    }))
    .await;
}
