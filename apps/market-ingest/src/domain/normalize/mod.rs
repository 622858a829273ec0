//! Normalizer
//!
//! Maps raw depth and trade events into [`NormalizedRecord`]s.
//!
//! Depth events follow a partial-success policy: every price level is parsed
//! independently, a malformed level yields one [`ParseError`] and is skipped,
//! and the remaining levels of the same event still produce records.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::market::{DepthEvent, PriceLevel, Side, TradeEvent};
use super::record::NormalizedRecord;

// =============================================================================
// Errors
// =============================================================================

/// Numeric field that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    /// Price field.
    Price,
    /// Size/quantity field.
    Size,
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price => f.write_str("price"),
            Self::Size => f.write_str("size"),
        }
    }
}

/// A numeric field in an event payload could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse {field} {raw:?} at sequence {sequence}: {reason}")]
pub struct ParseError {
    /// Which field failed.
    pub field: NumericField,
    /// The raw text that failed.
    pub raw: String,
    /// Update ID or trade ID of the offending event.
    pub sequence: u64,
    /// Decimal parser message.
    pub reason: String,
}

// =============================================================================
// Depth
// =============================================================================

/// Result of normalizing one depth event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthNormalization {
    /// Records built from well-formed levels, bids first then asks.
    pub records: Vec<NormalizedRecord>,
    /// One error per skipped level.
    pub errors: Vec<ParseError>,
}

impl DepthNormalization {
    /// True when every level produced a record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Normalize a depth event into one record per bid and ask level.
///
/// Records are stamped with the event time and the first update ID.
#[must_use]
pub fn normalize_depth(event: &DepthEvent) -> DepthNormalization {
    let timestamp = event.event_time_ms as f64;
    let sequence = event.first_update_id;

    let mut out = DepthNormalization {
        records: Vec::with_capacity(event.level_count()),
        errors: Vec::new(),
    };

    let sides = [(Side::Bid, &event.bids), (Side::Ask, &event.asks)];
    for (side, levels) in sides {
        for level in levels {
            match parse_level(level, sequence) {
                Ok((price, size)) => out.records.push(NormalizedRecord::book_delta(
                    timestamp, sequence, side, price, size,
                )),
                Err(error) => out.errors.push(error),
            }
        }
    }

    out
}

fn parse_level(level: &PriceLevel, sequence: u64) -> Result<(Decimal, Decimal), ParseError> {
    let price = parse_decimal(&level.price, NumericField::Price, sequence)?;
    let size = parse_decimal(&level.quantity, NumericField::Size, sequence)?;
    Ok((price, size))
}

// =============================================================================
// Trade
// =============================================================================

/// Normalize a trade event into exactly one record stamped with the trade
/// time and trade ID.
pub fn normalize_trade(event: &TradeEvent) -> Result<NormalizedRecord, ParseError> {
    let price = parse_decimal(&event.price, NumericField::Price, event.trade_id)?;
    let size = parse_decimal(&event.quantity, NumericField::Size, event.trade_id)?;
    Ok(NormalizedRecord::trade(
        event.trade_time_ms as f64,
        event.trade_id,
        price,
        size,
    ))
}

fn parse_decimal(raw: &str, field: NumericField, sequence: u64) -> Result<Decimal, ParseError> {
    Decimal::from_str(raw.trim()).map_err(|e| ParseError {
        field,
        raw: raw.to_string(),
        sequence,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn depth(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> DepthEvent {
        DepthEvent {
            symbol: "ETHBTC".to_string(),
            event_time_ms: 1000,
            first_update_id: 5,
            final_update_id: 7,
            bids,
            asks,
        }
    }

    fn trade(price: &str, quantity: &str) -> TradeEvent {
        TradeEvent {
            symbol: "ETHBTC".to_string(),
            event_time_ms: 2001,
            trade_time_ms: 2000,
            trade_id: 42,
            price: price.to_string(),
            quantity: quantity.to_string(),
            buyer_is_maker: false,
        }
    }

    #[test]
    fn depth_event_yields_bid_and_ask_records() {
        let event = depth(
            vec![PriceLevel::new("0.01", "2.0")],
            vec![PriceLevel::new("0.02", "1.5")],
        );

        let out = normalize_depth(&event);

        assert!(out.is_complete());
        assert_eq!(
            out.records,
            vec![
                NormalizedRecord::book_delta(
                    1000.0,
                    5,
                    Side::Bid,
                    Decimal::new(1, 2),
                    Decimal::new(20, 1)
                ),
                NormalizedRecord::book_delta(
                    1000.0,
                    5,
                    Side::Ask,
                    Decimal::new(2, 2),
                    Decimal::new(15, 1)
                ),
            ]
        );
    }

    #[test]
    fn asks_are_labelled_ask() {
        let event = depth(vec![], vec![PriceLevel::new("1", "1")]);
        let out = normalize_depth(&event);
        assert_eq!(out.records[0].side(), Some(Side::Ask));
    }

    #[test]
    fn trade_event_yields_one_trade_record() {
        let record = normalize_trade(&trade("0.03", "4")).unwrap();

        assert_eq!(record.timestamp(), 2000.0);
        assert_eq!(record.sequence(), 42);
        assert_eq!(record.price(), Decimal::new(3, 2));
        assert_eq!(record.size(), Decimal::from(4));
        assert!(record.is_trade());
    }

    #[test_case("abc", "4", NumericField::Price ; "bad price")]
    #[test_case("0.03", "", NumericField::Size ; "empty size")]
    #[test_case("x", "y", NumericField::Price ; "price reported first")]
    fn trade_parse_failure_names_field(price: &str, quantity: &str, field: NumericField) {
        let err = normalize_trade(&trade(price, quantity)).unwrap_err();
        assert_eq!(err.field, field);
        assert_eq!(err.sequence, 42);
    }

    #[test]
    fn malformed_level_skipped_siblings_kept() {
        let event = depth(
            vec![
                PriceLevel::new("0.01", "1"),
                PriceLevel::new("not-a-price", "1"),
                PriceLevel::new("0.03", "1"),
            ],
            vec![PriceLevel::new("0.04", "bad")],
        );

        let out = normalize_depth(&event);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.errors.len(), 2);
        assert_eq!(out.errors[0].field, NumericField::Price);
        assert_eq!(out.errors[0].raw, "not-a-price");
        assert_eq!(out.errors[1].field, NumericField::Size);
        assert_eq!(out.errors[1].raw, "bad");
    }

    #[test]
    fn parse_error_message_identifies_field_and_value() {
        let err = normalize_trade(&trade("1.2.3", "1")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("price"));
        assert!(message.contains("1.2.3"));
    }

    #[test]
    fn empty_depth_event_yields_nothing() {
        let out = normalize_depth(&depth(vec![], vec![]));
        assert!(out.records.is_empty());
        assert!(out.is_complete());
    }

    fn level_strategy() -> impl Strategy<Value = PriceLevel> {
        (0u64..1_000_000, 0u32..8, 0u64..1_000_000).prop_map(|(p, scale, q)| {
            PriceLevel::new(Decimal::new(p as i64, scale).to_string(), q.to_string())
        })
    }

    proptest! {
        #[test]
        fn depth_yields_one_record_per_level(
            bids in proptest::collection::vec(level_strategy(), 0..20),
            asks in proptest::collection::vec(level_strategy(), 0..20),
        ) {
            let event = depth(bids.clone(), asks.clone());
            let out = normalize_depth(&event);

            prop_assert_eq!(out.records.len(), bids.len() + asks.len());
            prop_assert!(out.records.iter().all(|r| !r.is_trade()));
            prop_assert!(out.records[..bids.len()].iter().all(|r| r.side() == Some(Side::Bid)));
            prop_assert!(out.records[bids.len()..].iter().all(|r| r.side() == Some(Side::Ask)));
        }

        #[test]
        fn one_bad_level_costs_one_record(
            levels in proptest::collection::vec(level_strategy(), 1..20),
            bad_index in any::<proptest::sample::Index>(),
        ) {
            let mut bids = levels;
            let k = bids.len();
            let idx = bad_index.index(k);
            bids[idx].price = "garbage".to_string();

            let out = normalize_depth(&depth(bids, vec![]));

            prop_assert_eq!(out.records.len(), k - 1);
            prop_assert_eq!(out.errors.len(), 1);
        }
    }
}
