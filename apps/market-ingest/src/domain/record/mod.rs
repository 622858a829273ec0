//! Normalized Record
//!
//! The uniform schema persisted for both book deltas and trades. Records are
//! immutable once built: fields are private and only readable through
//! accessors.

use rust_decimal::Decimal;

use super::market::Side;

/// A single time-series row handed to the storage sink.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    timestamp: f64,
    price: Decimal,
    size: Decimal,
    sequence: u64,
    is_trade: bool,
    side: Option<Side>,
}

impl NormalizedRecord {
    /// Build a book delta record.
    #[must_use]
    pub const fn book_delta(
        timestamp: f64,
        sequence: u64,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            timestamp,
            price,
            size,
            sequence,
            is_trade: false,
            side: Some(side),
        }
    }

    /// Build a trade record. Trades carry no book side.
    #[must_use]
    pub const fn trade(timestamp: f64, sequence: u64, price: Decimal, size: Decimal) -> Self {
        Self {
            timestamp,
            price,
            size,
            sequence,
            is_trade: true,
            side: None,
        }
    }

    /// Event time in epoch milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Size.
    #[must_use]
    pub const fn size(&self) -> Decimal {
        self.size
    }

    /// Update ID for deltas, trade ID for trades.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// True for trade prints, false for book deltas.
    #[must_use]
    pub const fn is_trade(&self) -> bool {
        self.is_trade
    }

    /// Book side; `None` for trades.
    #[must_use]
    pub const fn side(&self) -> Option<Side> {
        self.side
    }

    /// True when the record is a bid-side delta.
    #[must_use]
    pub fn is_bid(&self) -> bool {
        self.side == Some(Side::Bid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_delta_has_side() {
        let record =
            NormalizedRecord::book_delta(1000.0, 5, Side::Ask, Decimal::new(2, 2), Decimal::ONE);
        assert!(!record.is_trade());
        assert_eq!(record.side(), Some(Side::Ask));
        assert!(!record.is_bid());
        assert_eq!(record.sequence(), 5);
    }

    #[test]
    fn trade_has_no_side() {
        let record = NormalizedRecord::trade(2000.0, 42, Decimal::new(3, 2), Decimal::from(4));
        assert!(record.is_trade());
        assert_eq!(record.side(), None);
        assert!(!record.is_bid());
        assert_eq!(record.size(), Decimal::from(4));
    }
}
