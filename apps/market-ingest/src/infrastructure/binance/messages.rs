//! Binance Stream Message Types
//!
//! Wire formats for the raw `<symbol>@depth` and `<symbol>@trade` streams.
//! Prices and quantities arrive as JSON strings and are kept as text.
//!
//! # Depth update
//!
//! ```json
//! {
//!   "e": "depthUpdate",
//!   "E": 1672515782136,
//!   "s": "ETHBTC",
//!   "U": 157,
//!   "u": 160,
//!   "b": [["0.0024", "10"]],
//!   "a": [["0.0026", "100"]]
//! }
//! ```
//!
//! # Trade
//!
//! ```json
//! {
//!   "e": "trade",
//!   "E": 1672515782136,
//!   "s": "ETHBTC",
//!   "t": 12345,
//!   "p": "0.001",
//!   "q": "100",
//!   "T": 1672515782136,
//!   "m": true,
//!   "M": true
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::market::{DepthEvent, MarketEvent, PriceLevel, StreamKind, TradeEvent};

/// Incremental order book update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdateMessage {
    /// Event type (always "depthUpdate")
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (epoch ms)
    #[serde(rename = "E")]
    pub event_time: u64,

    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// First update ID in event
    #[serde(rename = "U")]
    pub first_update_id: u64,

    /// Final update ID in event
    #[serde(rename = "u")]
    pub final_update_id: u64,

    /// Bids to update, `[price, quantity]`
    #[serde(rename = "b", default)]
    pub bids: Vec<[String; 2]>,

    /// Asks to update, `[price, quantity]`
    #[serde(rename = "a", default)]
    pub asks: Vec<[String; 2]>,
}

/// A single trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Event type (always "trade")
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (epoch ms)
    #[serde(rename = "E")]
    pub event_time: u64,

    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// Trade ID
    #[serde(rename = "t")]
    pub trade_id: u64,

    /// Price
    #[serde(rename = "p")]
    pub price: String,

    /// Quantity
    #[serde(rename = "q")]
    pub quantity: String,

    /// Trade time (epoch ms)
    #[serde(rename = "T")]
    pub trade_time: u64,

    /// Is the buyer the market maker?
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

fn levels(raw: Vec<[String; 2]>) -> Vec<PriceLevel> {
    raw.into_iter()
        .map(|[price, quantity]| PriceLevel { price, quantity })
        .collect()
}

impl From<DepthUpdateMessage> for DepthEvent {
    fn from(msg: DepthUpdateMessage) -> Self {
        Self {
            symbol: msg.symbol,
            event_time_ms: msg.event_time,
            first_update_id: msg.first_update_id,
            final_update_id: msg.final_update_id,
            bids: levels(msg.bids),
            asks: levels(msg.asks),
        }
    }
}

impl From<TradeMessage> for TradeEvent {
    fn from(msg: TradeMessage) -> Self {
        Self {
            symbol: msg.symbol,
            event_time_ms: msg.event_time,
            trade_time_ms: msg.trade_time,
            trade_id: msg.trade_id,
            price: msg.price,
            quantity: msg.quantity,
            buyer_is_maker: msg.buyer_is_maker,
        }
    }
}

/// Decode one text frame of the given stream.
pub fn decode(kind: StreamKind, text: &str) -> Result<MarketEvent, serde_json::Error> {
    match kind {
        StreamKind::Depth => {
            serde_json::from_str::<DepthUpdateMessage>(text).map(|m| MarketEvent::Depth(m.into()))
        }
        StreamKind::Trade => {
            serde_json::from_str::<TradeMessage>(text).map(|m| MarketEvent::Trade(m.into()))
        }
    }
}
