//! Cross-venue arbitrage scoring (glossary: "arbitrage opportunity" — a
//! pair (bid on venue A, ask on venue B) with bid_A > ask_B). Replaces the
//! single-venue spread heuristic the funding-rate scoring engine used.

use serde::Serialize;

use crate::instrument::InstrumentPair;
use crate::orderbook::Venue;
use crate::orderbook_store::OrderBookStore;

/// One realizable opportunity: sell into `bid_venue`'s bid, buy off
/// `ask_venue`'s ask, for `pair`.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub pair: InstrumentPair,
    pub bid_venue: Venue,
    pub bid_price: f64,
    pub ask_venue: Venue,
    pub ask_price: f64,
    pub spread: f64,
    pub spread_pct: f64,
}

pub struct ScoringEngine {
    store: OrderBookStore,
}

impl ScoringEngine {
    pub fn new(store: OrderBookStore) -> Self {
        Self { store }
    }

    /// Scans every pair with books on two or more venues for a profitable
    /// bid/ask crossing, sorted by `spread_pct` descending (best first).
    pub fn compute_opportunities(&self) -> Vec<Opportunity> {
        let snapshots = self.store.all();
        let mut pairs: Vec<InstrumentPair> = snapshots.iter().map(|s| s.pair).collect();
        pairs.sort_by_key(|p| (p.base.name(), p.quote.name()));
        pairs.dedup();

        let mut opportunities = Vec::new();
        for pair in pairs {
            let books = self.store.venues_for(pair);
            for bid_book in &books {
                let Some(bid_price) = bid_book.best_bid else { continue };
                for ask_book in &books {
                    if ask_book.venue == bid_book.venue {
                        continue;
                    }
                    let Some(ask_price) = ask_book.best_ask else { continue };
                    if bid_price <= ask_price {
                        continue;
                    }

                    let spread = bid_price - ask_price;
                    opportunities.push(Opportunity {
                        pair,
                        bid_venue: bid_book.venue,
                        bid_price,
                        ask_venue: ask_book.venue,
                        ask_price,
                        spread,
                        spread_pct: spread / ask_price * 100.0,
                    });
                }
            }
        }

        opportunities.sort_by(|a, b| b.spread_pct.partial_cmp(&a.spread_pct).expect("spread_pct is never NaN"));
        opportunities
    }

    /// Formats a price with enough decimal places to always show at least
    /// 4 significant digits, regardless of magnitude (e.g. `68074.30`,
    /// `0.00002341`).
    pub fn format_price(price: f64) -> String {
        if price == 0.0 {
            return "0.00".to_string();
        }
        let magnitude = -price.log10().floor() as i32;
        let decimals = if magnitude < 0 { 2 } else { (magnitude + 4) as usize };
        format!("{price:.decimals$}")
    }
}
