//! The concurrent order-book data structure (§4.4): sorted bid/ask price
//! ladders with O(log n) point updates, O(1) top-of-book reads, and a
//! concurrently-readable "guarded" top-N snapshot.

pub mod binance;
pub mod coinbase;

use std::collections::BTreeMap;
use std::sync::Mutex;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::instrument::InstrumentPair;

/// Bound on the guarded top-N snapshot mirrored on each side (§3).
pub const GUARDED_SUBSET_SIZE: usize = 10;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Coinbase,
    Binance,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Coinbase => "coinbase",
            Venue::Binance => "binance",
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Side {
    Bid,
    Ask,
}

/// Per (venue, pair) order book. The two ladders are single-writer,
/// mutated only by the feed thread that owns the book; `guarded_bids`/
/// `guarded_asks` are the only cross-thread-readable state, each behind
/// its own mutex, republished after every batch of updates.
pub struct OrderBook {
    pub venue: Venue,
    pub pair: InstrumentPair,
    bids: BTreeMap<OrderedFloat<f64>, f64>,
    asks: BTreeMap<OrderedFloat<f64>, f64>,
    guarded_bids: Mutex<Vec<(f64, f64)>>,
    guarded_asks: Mutex<Vec<(f64, f64)>>,
}

impl OrderBook {
    pub fn new(venue: Venue, pair: InstrumentPair) -> Self {
        Self {
            venue,
            pair,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            guarded_bids: Mutex::new(Vec::new()),
            guarded_asks: Mutex::new(Vec::new()),
        }
    }

    /// Point-update rule for one side (§4.4):
    /// - `quantity > 0` and price absent → insert.
    /// - `quantity > 0` and price present → overwrite quantity.
    /// - `quantity <= 0` → remove price if present, else no-op.
    pub fn apply_update(&mut self, side: Side, price: f64, quantity: f64) {
        let ladder = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };

        let key = OrderedFloat(price);
        if quantity > 0.0 {
            ladder.insert(key, quantity);
        } else {
            ladder.remove(&key);
        }
    }

    /// Recomputes and atomically publishes the guarded snapshot for one
    /// side: the first `min(GUARDED_SUBSET_SIZE, |side|)` entries in
    /// sorted top-of-book order.
    pub fn publish_guarded(&self, side: Side) {
        match side {
            Side::Bid => {
                let top: Vec<(f64, f64)> = self
                    .bids
                    .iter()
                    .rev()
                    .take(GUARDED_SUBSET_SIZE)
                    .map(|(p, q)| (p.into_inner(), *q))
                    .collect();
                *self.guarded_bids.lock().expect("guarded_bids mutex poisoned") = top;
            }
            Side::Ask => {
                let top: Vec<(f64, f64)> = self
                    .asks
                    .iter()
                    .take(GUARDED_SUBSET_SIZE)
                    .map(|(p, q)| (p.into_inner(), *q))
                    .collect();
                *self.guarded_asks.lock().expect("guarded_asks mutex poisoned") = top;
            }
        }
    }

    /// Applies a batch of updates to one side and republishes the guarded
    /// snapshot for that side atomically afterward.
    pub fn apply_batch(&mut self, side: Side, updates: impl IntoIterator<Item = (f64, f64)>) {
        for (price, qty) in updates {
            self.apply_update(side, price, qty);
        }
        self.publish_guarded(side);
    }

    pub fn guarded_bids(&self) -> Vec<(f64, f64)> {
        self.guarded_bids.lock().expect("guarded_bids mutex poisoned").clone()
    }

    pub fn guarded_asks(&self) -> Vec<(f64, f64)> {
        self.guarded_asks.lock().expect("guarded_asks mutex poisoned").clone()
    }

    /// Highest bid price, read directly off the ladder (feed thread only).
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|p| p.into_inner())
    }

    /// Lowest ask price, read directly off the ladder (feed thread only).
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|p| p.into_inner())
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// A cheap, cross-thread-safe snapshot built only from the guarded
    /// vectors — the only state this book's invariants permit a reader on
    /// another thread to consult (§5: "Shared-resource policy").
    pub fn snapshot(&self) -> BookSnapshot {
        let bids = self.guarded_bids();
        let asks = self.guarded_asks();
        BookSnapshot {
            venue: self.venue,
            pair: self.pair,
            best_bid: bids.first().map(|(p, _)| *p),
            best_ask: asks.first().map(|(p, _)| *p),
            bids,
            asks,
        }
    }
}

/// A point-in-time, cheaply-cloneable view of a book's guarded top-N,
/// safe to hand to any thread (e.g. the scoring engine or the HTTP API).
#[derive(Clone, Debug, Serialize)]
pub struct BookSnapshot {
    pub venue: Venue,
    pub pair: InstrumentPair,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl BookSnapshot {
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask? - self.best_bid?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(Venue::Coinbase, InstrumentPair::new("btc", "usd"))
    }

    #[test]
    fn s1_scenario_from_spec() {
        let mut book = book();
        book.apply_batch(Side::Bid, [(100.0, 1.0), (101.0, 2.0)]);
        book.apply_batch(Side::Ask, [(102.0, 1.0)]);

        assert_eq!(book.guarded_bids(), vec![(101.0, 2.0), (100.0, 1.0)]);
        assert_eq!(book.guarded_asks(), vec![(102.0, 1.0)]);

        book.apply_batch(Side::Bid, [(101.0, 0.0)]);
        assert_eq!(book.guarded_bids(), vec![(100.0, 1.0)]);
    }

    #[test]
    fn idempotent_overwrite_not_addition() {
        let mut book = book();
        book.apply_update(Side::Bid, 100.0, 5.0);
        book.apply_update(Side::Bid, 100.0, 5.0);
        assert_eq!(book.best_bid(), Some(100.0));
        book.publish_guarded(Side::Bid);
        assert_eq!(book.guarded_bids(), vec![(100.0, 5.0)]);
    }

    #[test]
    fn remove_absent_price_is_noop() {
        let mut book = book();
        book.apply_update(Side::Bid, 100.0, -1.0);
        assert_eq!(book.bid_count(), 0);
    }

    #[test]
    fn guarded_truncates_to_ten() {
        let mut book = book();
        let updates: Vec<(f64, f64)> = (0..25).map(|i| (i as f64, 1.0)).collect();
        book.apply_batch(Side::Bid, updates);
        assert_eq!(book.guarded_bids().len(), GUARDED_SUBSET_SIZE);
        assert_eq!(book.guarded_bids()[0].0, 24.0);
        assert_eq!(book.guarded_bids()[9].0, 15.0);
    }

    #[test]
    fn guarded_smaller_than_bound_mirrors_whole_side() {
        let mut book = book();
        book.apply_batch(Side::Ask, [(1.0, 1.0), (2.0, 1.0)]);
        assert_eq!(book.guarded_asks(), vec![(1.0, 1.0), (2.0, 1.0)]);
    }

    #[test]
    fn top_of_book_ordering_within_one_side() {
        let mut book = book();
        book.apply_batch(Side::Bid, [(10.0, 1.0), (12.0, 1.0), (8.0, 1.0)]);
        book.apply_batch(Side::Ask, [(20.0, 1.0), (15.0, 1.0), (25.0, 1.0)]);

        let bids = book.guarded_bids();
        assert!(bids.windows(2).all(|w| w[0].0 >= w[1].0));

        let asks = book.guarded_asks();
        assert!(asks.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
