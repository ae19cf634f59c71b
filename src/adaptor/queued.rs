//! Bounded-queue adaptor (§4.6, §9 REDESIGN FLAGS).
//!
//! The original's `thread_queue<ItemT>` called a `pop_from_queue` method
//! that didn't exist on `std::queue` and busy-spun instead of blocking on
//! a condition variable; its worker also never checked a stop flag, so it
//! could not be shut down cleanly. `std::sync::mpsc::sync_channel` is a
//! real bounded, condition-variable-backed queue: `try_send` gives the
//! feed thread non-blocking, drop-on-full semantics, and the worker's
//! blocking `recv()` exits cleanly the moment the sender side is dropped.

use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::orderbook::{BookSnapshot, OrderBook};

/// What the queued worker thread runs against. Decoupled from `Strategy`
/// because the queue carries a lightweight `BookSnapshot`, not a live
/// `OrderBook` (the original's `feed_event_to_queue_item` transformation)
/// — the worker thread has no business touching the feed-owned ladders.
pub trait QueuedStrategy: Send + 'static {
    fn on_snapshot(&mut self, snapshot: &BookSnapshot);
}

pub struct QueuedFeedAdaptor {
    sender: Option<SyncSender<BookSnapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl QueuedFeedAdaptor {
    /// Spawns the dedicated worker thread with a bounded queue of
    /// `capacity` pending snapshots.
    pub fn new<S: QueuedStrategy>(mut strategy: S, capacity: usize) -> Self {
        let (sender, receiver) = sync_channel::<BookSnapshot>(capacity);

        let worker = std::thread::Builder::new()
            .name("strategy-queue-worker".into())
            .spawn(move || {
                while let Ok(snapshot) = receiver.recv() {
                    strategy.on_snapshot(&snapshot);
                }
            })
            .expect("failed to spawn strategy queue worker");

        Self { sender: Some(sender), worker: Some(worker) }
    }

    /// Registrable as an `EventHandler`: always returns `true` so the
    /// feed's dispatch never stalls waiting on the strategy. A full queue
    /// drops the event (backpressure, not blocking).
    pub fn feed_event_handler(&self, book: &OrderBook) -> bool {
        let Some(sender) = &self.sender else { return true };
        match sender.try_send(book.snapshot()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("WARN strategy queue full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("ERROR strategy queue worker is gone");
            }
        }
        true
    }

    /// Drops the sender (unblocking the worker's `recv()`) and joins it.
    pub fn stop_and_join(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for QueuedFeedAdaptor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentPair;
    use crate::orderbook::Venue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn book() -> OrderBook {
        OrderBook::new(Venue::Coinbase, InstrumentPair::new("btc", "usd"))
    }

    struct CountingStrategy(Arc<AtomicUsize>);
    impl QueuedStrategy for CountingStrategy {
        fn on_snapshot(&mut self, _snapshot: &BookSnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_never_blocks_and_worker_drains_queue() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut adaptor = QueuedFeedAdaptor::new(CountingStrategy(seen.clone()), 4);

        for _ in 0..3 {
            assert!(adaptor.feed_event_handler(&book()));
        }

        adaptor.stop_and_join();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn full_queue_drops_events_without_blocking() {
        struct SlowStrategy(Arc<AtomicUsize>);
        impl QueuedStrategy for SlowStrategy {
            fn on_snapshot(&mut self, _snapshot: &BookSnapshot) {
                std::thread::sleep(Duration::from_millis(50));
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let mut adaptor = QueuedFeedAdaptor::new(SlowStrategy(seen.clone()), 1);

        for _ in 0..10 {
            assert!(adaptor.feed_event_handler(&book()));
        }

        adaptor.stop_and_join();
        assert!(seen.load(Ordering::SeqCst) < 10);
    }
}
