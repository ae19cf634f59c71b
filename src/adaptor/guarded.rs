//! Lock-guarded adaptor (§4.6): the feed thread must never block, so the
//! strategy call is attempted under `try_lock` a bounded number of times
//! and the event is dropped silently on contention rather than waiting.

use std::sync::{Arc, Mutex};

use crate::orderbook::OrderBook;

use super::Strategy;

const MAX_LOCK_ATTEMPTS: u32 = 4;

pub struct GuardedFeedAdaptor<S: Strategy> {
    strategy: Arc<Mutex<S>>,
}

impl<S: Strategy> GuardedFeedAdaptor<S> {
    pub fn new(strategy: S) -> Self {
        Self { strategy: Arc::new(Mutex::new(strategy)) }
    }

    /// Returns `true` to continue dispatch, `false` to stop it — same
    /// contract as a directly-registered handler. A lock held for the
    /// full `MAX_LOCK_ATTEMPTS` attempts drops the event and returns
    /// `true` (dispatch continues; only the strategy missed this event).
    pub fn feed_event_handler(&self, book: &OrderBook) -> bool {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            match self.strategy.try_lock() {
                Ok(guard) => return guard.feed_event_handler(book),
                Err(_) => continue,
            }
        }
        tracing::warn!("WARN guarded adaptor dropped event after {MAX_LOCK_ATTEMPTS} lock attempts");
        true
    }

    pub fn as_handler(self: &Arc<Self>) -> crate::feed::EventHandler {
        let this = self.clone();
        Arc::new(move |book: &OrderBook| this.feed_event_handler(book))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentPair;
    use crate::orderbook::Venue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn book() -> OrderBook {
        OrderBook::new(Venue::Coinbase, InstrumentPair::new("btc", "usd"))
    }

    struct CountingStrategy(Arc<AtomicU32>);
    impl Strategy for CountingStrategy {
        fn feed_event_handler(&self, _book: &OrderBook) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn s4_dispatch_succeeds_when_lock_is_free() {
        let calls = Arc::new(AtomicU32::new(0));
        let adaptor = GuardedFeedAdaptor::new(CountingStrategy(calls.clone()));
        assert!(adaptor.feed_event_handler(&book()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn s4_event_dropped_silently_under_contention() {
        let calls = Arc::new(AtomicU32::new(0));
        let adaptor = Arc::new(GuardedFeedAdaptor::new(CountingStrategy(calls.clone())));

        let held = adaptor.strategy.clone();
        let guard = held.lock().unwrap();

        let result = adaptor.feed_event_handler(&book());
        assert!(result, "dispatch must continue even when the event is dropped");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(guard);
        thread::sleep(Duration::from_millis(1));
        assert!(adaptor.feed_event_handler(&book()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
