//! Cross-venue order book store (§4.4/§4.8): the scoring engine and the
//! introspection API only ever read `BookSnapshot`s out of here, never a
//! live `OrderBook` — which keeps the single-writer invariant on the
//! ladders intact across every consumer outside the owning feed thread.

use std::sync::Arc;

use dashmap::DashMap;

use crate::instrument::InstrumentPair;
use crate::orderbook::{BookSnapshot, Venue};

#[derive(Clone)]
pub struct OrderBookStore {
    inner: Arc<DashMap<(Venue, InstrumentPair), BookSnapshot>>,
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self { inner: Arc::new(DashMap::new()) }
    }

    pub fn update(&self, snapshot: BookSnapshot) {
        self.inner.insert((snapshot.venue, snapshot.pair), snapshot);
    }

    pub fn get(&self, venue: Venue, pair: InstrumentPair) -> Option<BookSnapshot> {
        self.inner.get(&(venue, pair)).map(|r| r.value().clone())
    }

    pub fn all(&self) -> Vec<BookSnapshot> {
        self.inner.iter().map(|r| r.value().clone()).collect()
    }

    /// All venues currently publishing a book for `pair`.
    pub fn venues_for(&self, pair: InstrumentPair) -> Vec<BookSnapshot> {
        self.inner
            .iter()
            .filter(|r| r.key().1 == pair)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(venue: Venue, pair: InstrumentPair, bid: f64, ask: f64) -> BookSnapshot {
        BookSnapshot {
            venue,
            pair,
            best_bid: Some(bid),
            best_ask: Some(ask),
            bids: vec![(bid, 1.0)],
            asks: vec![(ask, 1.0)],
        }
    }

    #[test]
    fn stores_independently_per_venue() {
        let store = OrderBookStore::new();
        let pair = InstrumentPair::new("btc", "usd");
        store.update(snapshot(Venue::Coinbase, pair, 100.0, 101.0));
        store.update(snapshot(Venue::Binance, pair, 99.0, 100.5));

        assert_eq!(store.get(Venue::Coinbase, pair).unwrap().best_bid, Some(100.0));
        assert_eq!(store.get(Venue::Binance, pair).unwrap().best_bid, Some(99.0));
        assert_eq!(store.venues_for(pair).len(), 2);
    }

    #[test]
    fn update_overwrites_same_key() {
        let store = OrderBookStore::new();
        let pair = InstrumentPair::new("btc", "usd");
        store.update(snapshot(Venue::Coinbase, pair, 100.0, 101.0));
        store.update(snapshot(Venue::Coinbase, pair, 105.0, 106.0));
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.get(Venue::Coinbase, pair).unwrap().best_bid, Some(105.0));
    }
}
