//! Coinbase Advanced Trade market feed: signed `level2`/`ticker` channel
//! subscriptions over one websocket, no REST bootstrap required (§4.4,
//! §4.5) — snapshot and update messages share the same wire shape.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{json, Value};

use crate::benchmark::Tracer;
use crate::config::Config;
use crate::errors::ExchangeError;
use crate::instrument::InstrumentPair;
use crate::json::get_f64_str;
use crate::orderbook::coinbase::{parse_updates, partition_by_side};
use crate::orderbook::{OrderBook, Side, Venue};
use crate::orderbook_store::OrderBookStore;
use crate::signing::{hmac_sha256_hex, now_seconds};
use crate::ws::{WsClient, WsCloser};

use super::{EventHandler, HandlerRegistry, MarketFeed, ORDERS_UPDATED, TICKER_UPDATED};

const SOCKET_URI: &str = "wss://advanced-trade-ws.coinbase.com";
const CHANNELS: [&str; 2] = ["level2", "ticker"];

struct PairState {
    pair: InstrumentPair,
    product_id: String,
    book: Mutex<OrderBook>,
}

pub struct CoinbaseFeed {
    pairs: Vec<Arc<PairState>>,
    api_key: String,
    api_secret: String,
    registry: Arc<HandlerRegistry>,
    store: OrderBookStore,
    tracer: Arc<Tracer>,
    closer: Mutex<Option<WsCloser>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CoinbaseFeed {
    pub fn new(
        config: &Config,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        store: OrderBookStore,
        tracer: Arc<Tracer>,
    ) -> Self {
        let pairs = config
            .pairs
            .iter()
            .map(|pair| {
                Arc::new(PairState {
                    pair: *pair,
                    product_id: pair.to_coinbase(),
                    book: Mutex::new(OrderBook::new(Venue::Coinbase, *pair)),
                })
            })
            .collect();

        Self {
            pairs,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            registry: Arc::new(HandlerRegistry::new()),
            store,
            tracer,
            closer: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Builds one signed subscribe message per channel. The plaintext
    /// signed is `timestamp || channel || comma-joined(product_ids)`,
    /// matching `wallet<coinbase_api>::sign_payload`'s convention of
    /// timestamp-prefixed concatenation.
    fn subscribe_messages(&self) -> Vec<Value> {
        let product_ids: Vec<String> = self.pairs.iter().map(|p| p.product_id.clone()).collect();
        let joined = product_ids.join(",");
        let timestamp = now_seconds().to_string();

        CHANNELS
            .iter()
            .map(|channel| {
                let plaintext = format!("{timestamp}{channel}{joined}");
                let signature = hmac_sha256_hex(&self.api_secret, &plaintext);
                json!({
                    "type": "subscribe",
                    "product_ids": product_ids,
                    "channel": channel,
                    "api_key": self.api_key,
                    "timestamp": timestamp,
                    "signature": signature,
                })
            })
            .collect()
    }

    fn find_pair(pairs: &[Arc<PairState>], product_id: &str) -> Option<&Arc<PairState>> {
        pairs.iter().find(|p| p.product_id == product_id)
    }

    fn handle_message(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        payload: &Value,
    ) -> bool {
        tracer.record("coinbase_message_received");

        let Some(channel) = payload.get("channel").and_then(Value::as_str) else {
            tracing::warn!("WARN coinbase message missing channel: {payload}");
            return true;
        };

        match channel {
            "l2_data" => Self::handle_l2_data(pairs, registry, store, tracer, payload),
            "ticker" => Self::handle_ticker(pairs, registry, store, tracer, payload),
            "subscriptions" => {
                tracing::info!("SUCCESS coinbase subscriptions ack: {payload}");
            }
            "error" => {
                tracing::error!("ERROR coinbase feed error event: {payload}");
                return false;
            }
            other => tracing::warn!("WARN unknown coinbase channel: {other}"),
        }

        true
    }

    fn handle_l2_data(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        payload: &Value,
    ) {
        let Some(events) = payload.get("events").and_then(Value::as_array) else {
            tracing::warn!("WARN l2_data message missing events array: {payload}");
            return;
        };

        for event in events {
            let Some(event_type) = event.get("type").and_then(Value::as_str) else {
                continue;
            };
            if event_type != "snapshot" && event_type != "update" {
                tracing::warn!("WARN unknown l2_data event type: {event_type}");
                continue;
            }

            let Some(product_id) = event.get("product_id").and_then(Value::as_str) else {
                tracing::warn!("WARN l2_data event missing product_id: {event}");
                continue;
            };
            let Some(state) = Self::find_pair(pairs, product_id) else {
                tracing::warn!("WARN l2_data event for unrecognized product {product_id}");
                continue;
            };

            let updates = parse_updates(event.get("updates").unwrap_or(&Value::Null));
            let (bids, asks) = partition_by_side(updates);

            let mut book = state.book.lock().expect("book mutex poisoned");
            book.apply_batch(Side::Bid, bids);
            book.apply_batch(Side::Ask, asks);
            store.update(book.snapshot());
            tracer.record("coinbase_orders_dispatched");
            registry.dispatch(state.pair, ORDERS_UPDATED, &book);
        }
    }

    fn handle_ticker(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        payload: &Value,
    ) {
        let Some(events) = payload.get("events").and_then(Value::as_array) else {
            return;
        };

        for event in events {
            let Some(tickers) = event.get("tickers").and_then(Value::as_array) else {
                continue;
            };
            for ticker in tickers {
                let Some(product_id) = ticker.get("product_id").and_then(Value::as_str) else {
                    continue;
                };
                let Some(state) = Self::find_pair(pairs, product_id) else {
                    continue;
                };
                if get_f64_str(ticker, &["price"]).is_none() {
                    tracing::warn!("WARN malformed ticker price: {ticker}");
                }

                let book = state.book.lock().expect("book mutex poisoned");
                store.update(book.snapshot());
                tracer.record("coinbase_ticker_dispatched");
                registry.dispatch(state.pair, TICKER_UPDATED, &book);
            }
        }
    }
}

impl MarketFeed for CoinbaseFeed {
    fn start_feed(&self) -> Result<(), ExchangeError> {
        let mut guard = self.thread.lock().expect("thread mutex poisoned");
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ExchangeError::UnexpectedData(
                "start_feed called while already running".into(),
            ));
        }

        let pairs = self.pairs.clone();
        let registry = self.registry.clone();
        let store = self.store.clone();
        let tracer = self.tracer.clone();
        let opening_messages = self.subscribe_messages();
        let closer_slot = Arc::new(Mutex::new(None));
        let closer_slot_for_thread = closer_slot.clone();

        let handle = std::thread::Builder::new()
            .name("coinbase-feed".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build feed runtime");

                rt.block_on(async move {
                    let pairs_for_cb = pairs.clone();
                    let registry_for_cb = registry.clone();
                    let store_for_cb = store.clone();
                    let tracer_for_cb = tracer.clone();
                    let on_message = move |payload: Value| -> bool {
                        Self::handle_message(&pairs_for_cb, &registry_for_cb, &store_for_cb, &tracer_for_cb, &payload)
                    };

                    let mut client = WsClient::new(SOCKET_URI, on_message);
                    for msg in opening_messages {
                        client.add_opening_message_json(msg);
                    }
                    *closer_slot_for_thread.lock().expect("closer slot poisoned") = Some(client.closer());
                    tracer.record("coinbase_ws_connecting");

                    if let Err(e) = client.connect().await {
                        tracing::error!("ERROR coinbase feed connection ended: {e}");
                    }
                });
            })
            .expect("failed to spawn coinbase feed thread");

        *guard = Some(handle);
        drop(guard);

        for _ in 0..50 {
            if let Some(closer) = closer_slot.lock().expect("closer slot poisoned").clone() {
                *self.closer.lock().expect("closer mutex poisoned") = Some(closer);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        Ok(())
    }

    fn join(&self) {
        let handle = self.thread.lock().expect("thread mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn close(&self) {
        if let Some(closer) = self.closer.lock().expect("closer mutex poisoned").as_ref() {
            closer.close();
        }
    }

    fn register_event_handler(&self, pair: InstrumentPair, mask: u8, handler: EventHandler) {
        self.registry.register(pair, mask, handler);
    }

    fn register_raw_event_handler(&self, pair: InstrumentPair, mask: u8, handler: EventHandler) {
        self.registry.register_raw(pair, mask, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            pairs: vec![InstrumentPair::new("btc", "usd")],
            api_port: 3000,
            binance_api_key: String::new(),
            binance_api_secret: String::new(),
            coinbase_api_key: "key".into(),
            coinbase_api_secret: "secret".into(),
        }
    }

    #[test]
    fn subscribe_messages_cover_every_channel() {
        let store = OrderBookStore::new();
        let feed = CoinbaseFeed::new(&config(), "key", "secret", store, Arc::new(Tracer::new()));
        let messages = feed.subscribe_messages();
        assert_eq!(messages.len(), CHANNELS.len());
        assert_eq!(messages[0]["channel"], "level2");
        assert_eq!(messages[1]["channel"], "ticker");
        assert_eq!(messages[0]["product_ids"][0], "BTC-USD");
    }

    #[test]
    fn error_channel_signals_connection_close() {
        let pairs: Vec<Arc<PairState>> = Vec::new();
        let registry = HandlerRegistry::new();
        let store = OrderBookStore::new();
        let tracer = Tracer::new();

        let should_continue = CoinbaseFeed::handle_message(
            &pairs,
            &registry,
            &store,
            &tracer,
            &json!({"channel": "error", "message": "boom"}),
        );
        assert!(!should_continue, "error channel must signal the ws loop to close");
    }

    #[test]
    fn subscriptions_ack_keeps_connection_open() {
        let pairs: Vec<Arc<PairState>> = Vec::new();
        let registry = HandlerRegistry::new();
        let store = OrderBookStore::new();
        let tracer = Tracer::new();

        let should_continue = CoinbaseFeed::handle_message(
            &pairs,
            &registry,
            &store,
            &tracer,
            &json!({"channel": "subscriptions"}),
        );
        assert!(should_continue);
    }
}
