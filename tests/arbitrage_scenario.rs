use arbiter_core::instrument::InstrumentPair;
use arbiter_core::orderbook::{OrderBook, Side, Venue};
use arbiter_core::orderbook_store::OrderBookStore;
use arbiter_core::scoring::ScoringEngine;

/// Two venues quoting the same pair, with Coinbase's bid crossing
/// Binance's ask: a realizable opportunity should surface, priced and
/// oriented correctly.
#[test]
fn detects_cross_venue_crossing() {
    let pair = InstrumentPair::new("btc", "usd");
    let store = OrderBookStore::new();

    let mut coinbase_book = OrderBook::new(Venue::Coinbase, pair);
    coinbase_book.apply_batch(Side::Bid, [(50100.0, 1.0)]);
    coinbase_book.apply_batch(Side::Ask, [(50200.0, 1.0)]);
    store.update(coinbase_book.snapshot());

    let mut binance_book = OrderBook::new(Venue::Binance, pair);
    binance_book.apply_batch(Side::Bid, [(49900.0, 1.0)]);
    binance_book.apply_batch(Side::Ask, [(50000.0, 1.0)]);
    store.update(binance_book.snapshot());

    let engine = ScoringEngine::new(store);
    let opportunities = engine.compute_opportunities();

    assert_eq!(opportunities.len(), 1);
    let opp = &opportunities[0];
    assert_eq!(opp.pair, pair);
    assert_eq!(opp.bid_venue, Venue::Coinbase);
    assert_eq!(opp.bid_price, 50100.0);
    assert_eq!(opp.ask_venue, Venue::Binance);
    assert_eq!(opp.ask_price, 50000.0);
    assert_eq!(opp.spread, 100.0);
}

/// When both venues' books are in the ordinary (non-crossing) orientation
/// no opportunity should be manufactured.
#[test]
fn non_crossing_books_yield_no_opportunities() {
    let pair = InstrumentPair::new("eth", "usd");
    let store = OrderBookStore::new();

    let mut coinbase_book = OrderBook::new(Venue::Coinbase, pair);
    coinbase_book.apply_batch(Side::Bid, [(3000.0, 1.0)]);
    coinbase_book.apply_batch(Side::Ask, [(3005.0, 1.0)]);
    store.update(coinbase_book.snapshot());

    let mut binance_book = OrderBook::new(Venue::Binance, pair);
    binance_book.apply_batch(Side::Bid, [(2995.0, 1.0)]);
    binance_book.apply_batch(Side::Ask, [(3010.0, 1.0)]);
    store.update(binance_book.snapshot());

    let engine = ScoringEngine::new(store);
    assert!(engine.compute_opportunities().is_empty());
}

/// A pair quoted on only one venue can never produce an opportunity, and
/// must not appear in the scan at all.
#[test]
fn single_venue_pair_is_ignored() {
    let pair = InstrumentPair::new("sol", "usd");
    let store = OrderBookStore::new();

    let mut book = OrderBook::new(Venue::Binance, pair);
    book.apply_batch(Side::Bid, [(150.0, 10.0)]);
    book.apply_batch(Side::Ask, [(150.5, 10.0)]);
    store.update(book.snapshot());

    let engine = ScoringEngine::new(store);
    assert!(engine.compute_opportunities().is_empty());
}
