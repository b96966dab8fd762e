//! Sorted order book ladders for a single (venue, market, outcome).

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use cross_arb_core::Side;

/// Top levels of both sides, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Best-first (descending price).
    pub bids: Vec<(Decimal, Decimal)>,
    /// Best-first (ascending price).
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Maintains the complete, sorted order book for one outcome.
///
/// Bids sort descending (via `Reverse`), asks ascending. A level with size
/// zero is removed, so no zero-size entry is ever retained. Crossed books
/// are not rejected here; venues may briefly cross.
#[derive(Debug, Clone)]
pub struct PriceBook {
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    /// Monotonic per-book update time, used by the staleness gate.
    pub last_update: DateTime<Utc>,
}

impl PriceBook {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: Utc::now(),
        }
    }

    /// Applies a single normalized update. `size == 0` removes the level.
    pub fn apply(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Buy => {
                if size.is_zero() {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Sell => {
                if size.is_zero() {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }
        self.last_update = Utc::now();
    }

    /// Applies a batch of updates in order.
    pub fn apply_many(&mut self, side: Side, levels: &[(Decimal, Decimal)]) {
        for (price, size) in levels {
            self.apply(side, *price, *size);
        }
    }

    /// Returns the best bid and best ask as (price, size) pairs.
    #[must_use]
    pub fn top(&self) -> (Option<(Decimal, Decimal)>, Option<(Decimal, Decimal)>) {
        let best_bid = self.bids.iter().next().map(|(Reverse(p), s)| (*p, *s));
        let best_ask = self.asks.iter().next().map(|(p, s)| (*p, *s));
        (best_bid, best_ask)
    }

    /// Returns the best bid as a (price, size) pair.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.top().0
    }

    /// Returns the best ask as a (price, size) pair.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.top().1
    }

    /// Returns the top `depth` levels per side.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            bids: self
                .bids
                .iter()
                .take(depth)
                .map(|(Reverse(p), s)| (*p, *s))
                .collect(),
            asks: self.asks.iter().take(depth).map(|(p, s)| (*p, *s)).collect(),
        }
    }

    /// Empties both ladders.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update = Utc::now();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filled_book() -> PriceBook {
        let mut book = PriceBook::new();
        book.apply_many(
            Side::Buy,
            &[(dec!(0.48), dec!(100)), (dec!(0.47), dec!(200))],
        );
        book.apply_many(
            Side::Sell,
            &[(dec!(0.52), dec!(150)), (dec!(0.53), dec!(250))],
        );
        book
    }

    #[test]
    fn test_top_of_book() {
        let book = filled_book();
        assert_eq!(book.best_bid(), Some((dec!(0.48), dec!(100))));
        assert_eq!(book.best_ask(), Some((dec!(0.52), dec!(150))));
    }

    #[test]
    fn test_zero_size_removes_level() {
        let mut book = filled_book();
        book.apply(Side::Buy, dec!(0.48), Decimal::ZERO);
        assert_eq!(book.best_bid(), Some((dec!(0.47), dec!(200))));

        book.apply(Side::Sell, dec!(0.52), Decimal::ZERO);
        assert_eq!(book.best_ask(), Some((dec!(0.53), dec!(250))));
    }

    #[test]
    fn test_no_zero_size_level_retained() {
        let mut book = PriceBook::new();
        book.apply(Side::Buy, dec!(0.50), Decimal::ZERO);
        assert!(book.is_empty());

        book.apply(Side::Buy, dec!(0.50), dec!(10));
        book.apply(Side::Buy, dec!(0.50), Decimal::ZERO);
        let snapshot = book.snapshot(10);
        assert!(snapshot.bids.iter().all(|(_, s)| !s.is_zero()));
        assert!(book.is_empty());
    }

    #[test]
    fn test_update_replaces_size() {
        let mut book = filled_book();
        book.apply(Side::Buy, dec!(0.48), dec!(60));
        assert_eq!(book.best_bid(), Some((dec!(0.48), dec!(60))));
    }

    #[test]
    fn test_snapshot_depth_and_order() {
        let book = filled_book();
        let snapshot = book.snapshot(1);
        assert_eq!(snapshot.bids, vec![(dec!(0.48), dec!(100))]);
        assert_eq!(snapshot.asks, vec![(dec!(0.52), dec!(150))]);

        let deep = book.snapshot(5);
        assert_eq!(deep.bids.len(), 2);
        assert_eq!(deep.bids[0].0, dec!(0.48));
        assert_eq!(deep.bids[1].0, dec!(0.47));
        assert_eq!(deep.asks[0].0, dec!(0.52));
    }

    #[test]
    fn test_reapplying_snapshot_is_idempotent() {
        let levels_bid = [(dec!(0.48), dec!(100)), (dec!(0.47), dec!(200))];
        let levels_ask = [(dec!(0.52), dec!(150))];

        let mut book = PriceBook::new();
        book.apply_many(Side::Buy, &levels_bid);
        book.apply_many(Side::Sell, &levels_ask);
        let top_first = book.top();
        let snap_first = book.snapshot(10);

        book.apply_many(Side::Buy, &levels_bid);
        book.apply_many(Side::Sell, &levels_ask);
        assert_eq!(book.top(), top_first);
        assert_eq!(book.snapshot(10), snap_first);
    }

    #[test]
    fn test_clear_empties_both_ladders() {
        let mut book = filled_book();
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.top(), (None, None));
    }

    #[test]
    fn test_last_update_advances_on_mutation() {
        let mut book = PriceBook::new();
        let t0 = book.last_update;
        book.apply(Side::Buy, dec!(0.50), dec!(1));
        assert!(book.last_update >= t0);
    }

    #[test]
    fn test_crossed_book_not_rejected() {
        let mut book = PriceBook::new();
        book.apply(Side::Buy, dec!(0.55), dec!(10));
        book.apply(Side::Sell, dec!(0.50), dec!(10));
        assert_eq!(book.best_bid().unwrap().0, dec!(0.55));
        assert_eq!(book.best_ask().unwrap().0, dec!(0.50));
    }
}
