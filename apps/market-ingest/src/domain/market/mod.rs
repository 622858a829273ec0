//! Market Events
//!
//! Venue-agnostic representation of the two stream kinds the recorder
//! ingests: incremental order book updates and individual trade prints.
//! Prices and quantities stay textual here; the normalizer owns parsing so
//! that a malformed entry can be skipped without discarding its siblings.

use std::fmt;

// =============================================================================
// Symbol
// =============================================================================

/// Trading pair symbol (e.g., "ETHBTC"), stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

/// Error returned when a symbol string is empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("symbol cannot be empty")]
pub struct EmptySymbol;

impl Symbol {
    /// Create a symbol, trimming whitespace and upper-casing it.
    pub fn new(raw: &str) -> Result<Self, EmptySymbol> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptySymbol);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Upper-case form, as used by REST endpoints.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form, as used in stream names.
    #[must_use]
    pub fn to_stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Stream Kind / Side
// =============================================================================

/// The two subscriptions opened per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Incremental order book updates.
    Depth,
    /// Individual trade prints.
    Trade,
}

impl StreamKind {
    /// Start order used by the coordinator.
    pub const ALL: [Self; 2] = [Self::Depth, Self::Trade];

    /// Label used in logs, metrics and stream names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Book side of a depth entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Bid (buy) side.
    Bid,
    /// Ask (sell) side.
    Ask,
}

impl Side {
    /// Label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

// =============================================================================
// Raw Events
// =============================================================================

/// One `[price, quantity]` pair of a depth update, still as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price as sent by the venue.
    pub price: String,
    /// Quantity as sent by the venue.
    pub quantity: String,
}

impl PriceLevel {
    /// Create a level from its textual parts.
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            quantity: quantity.into(),
        }
    }
}

/// Incremental order book change since the previous update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthEvent {
    /// Symbol the update belongs to.
    pub symbol: String,
    /// Event time in epoch milliseconds.
    pub event_time_ms: u64,
    /// First update ID in this event.
    pub first_update_id: u64,
    /// Final update ID in this event.
    pub final_update_id: u64,
    /// Bid levels to update.
    pub bids: Vec<PriceLevel>,
    /// Ask levels to update.
    pub asks: Vec<PriceLevel>,
}

impl DepthEvent {
    /// Number of price levels carried by the event.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    /// Symbol the trade belongs to.
    pub symbol: String,
    /// Event time in epoch milliseconds.
    pub event_time_ms: u64,
    /// Trade time in epoch milliseconds.
    pub trade_time_ms: u64,
    /// Venue trade ID.
    pub trade_id: u64,
    /// Price as sent by the venue.
    pub price: String,
    /// Quantity as sent by the venue.
    pub quantity: String,
    /// Whether the buyer was the resting (maker) order.
    pub buyer_is_maker: bool,
}

/// Any event a stream source can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketEvent {
    /// Order book update.
    Depth(DepthEvent),
    /// Trade print.
    Trade(TradeEvent),
}

impl MarketEvent {
    /// Stream kind this event belongs to.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::Depth(_) => StreamKind::Depth,
            Self::Trade(_) => StreamKind::Trade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_trimmed_and_uppercased() {
        let symbol = Symbol::new("  ethbtc ").unwrap();
        assert_eq!(symbol.as_str(), "ETHBTC");
        assert_eq!(symbol.to_stream_name(), "ethbtc");
        assert_eq!(symbol.to_string(), "ETHBTC");
    }

    #[test]
    fn empty_symbol_rejected() {
        assert_eq!(Symbol::new("   "), Err(EmptySymbol));
    }

    #[test]
    fn stream_kind_order_is_depth_then_trade() {
        assert_eq!(StreamKind::ALL, [StreamKind::Depth, StreamKind::Trade]);
        assert_eq!(StreamKind::Depth.as_str(), "depth");
        assert_eq!(StreamKind::Trade.as_str(), "trade");
    }

    #[test]
    fn market_event_kind() {
        let depth = MarketEvent::Depth(DepthEvent {
            symbol: "ETHBTC".to_string(),
            event_time_ms: 1,
            first_update_id: 1,
            final_update_id: 1,
            bids: vec![PriceLevel::new("1", "1")],
            asks: vec![],
        });
        assert_eq!(depth.kind(), StreamKind::Depth);
        if let MarketEvent::Depth(event) = depth {
            assert_eq!(event.level_count(), 1);
        }
    }
}
