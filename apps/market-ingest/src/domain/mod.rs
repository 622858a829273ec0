//! Domain Layer - Market events, normalized records and the normalizer.
//!
//! Everything in this layer is pure: no I/O, no tasks, no clocks. Adapters
//! translate venue wire formats into these types before they reach the
//! workers.

/// Symbols, stream kinds and raw venue events.
pub mod market;

/// The normalized time-series record written to storage.
pub mod record;

/// Conversion of raw events into normalized records.
pub mod normalize;
