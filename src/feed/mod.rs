//! Event-dispatch and market-feed contract (§4.5, §9 REDESIGN FLAGS).
//!
//! The original dispatched to two distinct handler kinds — `std::function`
//! closures and raw function pointers carrying an `std::any` opaque state
//! — through template specialization per exchange. Here both handler
//! kinds collapse into the same type-erased capability (`Arc<dyn Fn>`),
//! tagged with a `HandlerKind` priority so raw-equivalent registrations
//! still run before callable-equivalent ones, and `MarketFeed` becomes a
//! single trait implemented once per venue instead of a template
//! specialization.

pub mod binance;
pub mod coinbase;

use std::sync::{Arc, Mutex};

use crate::instrument::InstrumentPair;
use crate::orderbook::OrderBook;

pub const ORDERS_UPDATED: u8 = 0x01;
pub const TICKER_UPDATED: u8 = 0x02;
pub const ALL: u8 = 0xFF;

pub type EventHandler = Arc<dyn Fn(&OrderBook) -> bool + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum HandlerKind {
    Raw = 0,
    Callable = 1,
}

struct Registration {
    pair: InstrumentPair,
    mask: u8,
    kind: HandlerKind,
    handler: EventHandler,
}

/// Two lists folded into one, ordered registry: raw-priority handlers
/// dispatch before callable-priority ones; within a priority class,
/// insertion order is preserved. Dispatch stops early the moment a
/// handler returns `false`.
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: Mutex<Vec<Registration>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { registrations: Mutex::new(Vec::new()) }
    }

    pub fn register_raw(&self, pair: InstrumentPair, mask: u8, handler: EventHandler) {
        self.push(pair, mask, HandlerKind::Raw, handler);
    }

    pub fn register(&self, pair: InstrumentPair, mask: u8, handler: EventHandler) {
        self.push(pair, mask, HandlerKind::Callable, handler);
    }

    fn push(&self, pair: InstrumentPair, mask: u8, kind: HandlerKind, handler: EventHandler) {
        self.registrations
            .lock()
            .expect("handler registry mutex poisoned")
            .push(Registration { pair, mask, kind, handler });
    }

    /// Dispatches `event_mask` for `pair` against `book`, raw handlers
    /// first then callable, insertion order preserved within each class.
    pub fn dispatch(&self, pair: InstrumentPair, event_mask: u8, book: &OrderBook) {
        let registrations = self.registrations.lock().expect("handler registry mutex poisoned");

        let mut matching: Vec<&Registration> = registrations
            .iter()
            .filter(|r| r.pair == pair && (r.mask & event_mask) != 0)
            .collect();
        // stable sort: equal keys (same HandlerKind) keep their relative
        // (insertion) order, which is exactly the guarantee §5 requires.
        matching.sort_by_key(|r| r.kind);

        for registration in matching {
            if !(registration.handler)(book) {
                return;
            }
        }
    }
}

/// Capability set every concrete feed (Binance, Coinbase) implements.
/// Mirrors the original's `is_market_feed` concept as a real trait.
pub trait MarketFeed: Send + Sync {
    /// Spawns the feed's dedicated background thread and starts the
    /// websocket I/O loop. Calling this twice while the previous run is
    /// still active is a logic error.
    fn start_feed(&self) -> Result<(), crate::errors::ExchangeError>;

    /// Blocks the calling thread until the feed's background thread exits.
    fn join(&self);

    /// Signals the websocket to close; safe to call from any thread.
    fn close(&self);

    fn register_event_handler(&self, pair: InstrumentPair, mask: u8, handler: EventHandler);
    fn register_raw_event_handler(&self, pair: InstrumentPair, mask: u8, handler: EventHandler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::Venue;
    use std::sync::atomic::{AtomicU8, Ordering};

    fn book() -> OrderBook {
        OrderBook::new(Venue::Coinbase, InstrumentPair::new("btc", "usd"))
    }

    #[test]
    fn dispatch_order_is_raw_then_callable_insertion_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let o1 = order.clone();
        registry.register_raw(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            o1.lock().unwrap().push("h1");
            true
        }));
        let o2 = order.clone();
        registry.register_raw(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            o2.lock().unwrap().push("h2");
            true
        }));
        let o3 = order.clone();
        registry.register(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            o3.lock().unwrap().push("h3");
            true
        }));
        let o4 = order.clone();
        registry.register(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            o4.lock().unwrap().push("h4");
            true
        }));

        registry.dispatch(InstrumentPair::new("btc", "usd"), ALL, &book());
        assert_eq!(*order.lock().unwrap(), vec!["h1", "h2", "h3", "h4"]);
    }

    #[test]
    fn dispatch_stops_when_handler_returns_false() {
        let registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicU8::new(0));

        let c1 = calls.clone();
        registry.register_raw(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
            true
        }));
        let c2 = calls.clone();
        registry.register_raw(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
            false
        }));
        let c3 = calls.clone();
        registry.register(InstrumentPair::new("btc", "usd"), ALL, Arc::new(move |_| {
            c3.fetch_add(1, Ordering::SeqCst);
            true
        }));

        registry.dispatch(InstrumentPair::new("btc", "usd"), ALL, &book());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn s3_event_mask_filters_non_matching_events() {
        let registry = HandlerRegistry::new();
        let fired = Arc::new(AtomicU8::new(0));
        let f = fired.clone();

        registry.register(
            InstrumentPair::new("btc", "usd"),
            TICKER_UPDATED,
            Arc::new(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
                true
            }),
        );

        registry.dispatch(InstrumentPair::new("btc", "usd"), ORDERS_UPDATED, &book());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        registry.dispatch(InstrumentPair::new("btc", "usd"), TICKER_UPDATED, &book());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_ignores_non_matching_pair() {
        let registry = HandlerRegistry::new();
        let fired = Arc::new(AtomicU8::new(0));
        let f = fired.clone();
        registry.register(InstrumentPair::new("eth", "usd"), ALL, Arc::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            true
        }));

        registry.dispatch(InstrumentPair::new("btc", "usd"), ALL, &book());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
