//! Binance.US market feed: combined depth + kline stream, REST snapshot
//! bootstrap with buffered-update ordering (§4.5, §6).

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::benchmark::Tracer;
use crate::config::Config;
use crate::errors::ExchangeError;
use crate::http::RequestBatch;
use crate::instrument::InstrumentPair;
use crate::json::get_str;
use crate::orderbook::binance::{
    parse_levels, parse_snapshot, parse_ticker_price, BinanceBootstrap, BufferedUpdate,
};
use crate::orderbook::{OrderBook, Side, Venue};
use crate::orderbook_store::OrderBookStore;
use crate::ws::{WsClient, WsCloser};

use super::{EventHandler, HandlerRegistry, MarketFeed, ORDERS_UPDATED, TICKER_UPDATED};

const SOCKET_HOST: &str = "wss://stream.binance.us:9443";
const REST_BASE_URL: &str = "https://www.binance.us";
const DEPTH_PATH: &str = "/api/v1/depth";

struct PairState {
    pair: InstrumentPair,
    symbol: String,
    api_key: String,
    book: Mutex<OrderBook>,
    bootstrap: Mutex<BinanceBootstrap>,
}

pub struct BinanceFeed {
    pairs: Vec<Arc<PairState>>,
    registry: Arc<HandlerRegistry>,
    store: OrderBookStore,
    tracer: Arc<Tracer>,
    closer: Mutex<Option<WsCloser>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BinanceFeed {
    pub fn new(config: &Config, api_key: impl Into<String>, store: OrderBookStore, tracer: Arc<Tracer>) -> Self {
        let api_key = api_key.into();
        let pairs = config
            .pairs
            .iter()
            .map(|pair| {
                Arc::new(PairState {
                    pair: *pair,
                    symbol: pair.to_binance(),
                    api_key: api_key.clone(),
                    book: Mutex::new(OrderBook::new(Venue::Binance, *pair)),
                    bootstrap: Mutex::new(BinanceBootstrap::new()),
                })
            })
            .collect();

        Self {
            pairs,
            registry: Arc::new(HandlerRegistry::new()),
            store,
            tracer,
            closer: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    fn combined_stream_uri(&self) -> String {
        let streams: Vec<String> = self
            .pairs
            .iter()
            .flat_map(|p| {
                let lower = p.pair.to_binance_lower();
                [format!("{lower}@depth@100ms"), format!("{lower}@kline_1s")]
            })
            .collect();
        format!("{SOCKET_HOST}/stream?streams={}", streams.join("/"))
    }

    async fn fetch_and_apply_snapshot(state: Arc<PairState>) {
        loop {
            let mut batch = RequestBatch::new();
            batch
                .add_request(format!("{REST_BASE_URL}{DEPTH_PATH}"), Method::GET)
                .add_url_param("symbol", state.symbol.clone())
                .add_url_param("limit", "5000")
                .add_header("X-MBX-APIKEY", state.api_key.clone());

            let failures = batch.fetch_all().await;
            if failures > 0 {
                tracing::error!(
                    "ERROR failed to fetch {} snapshot: {}",
                    state.symbol,
                    batch.get_error_msg(0)
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let doc: Value = match serde_json::from_str(batch.get_response(0)) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!("ERROR failed to parse {} snapshot: {e}", state.symbol);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some((last_update_id, bids, asks)) = parse_snapshot(&doc) else {
                tracing::error!("ERROR malformed {} snapshot response: {doc}", state.symbol);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };

            let mut bootstrap = state.bootstrap.lock().expect("bootstrap mutex poisoned");
            bootstrap.apply_snapshot(last_update_id);

            match bootstrap.drain() {
                Some(batches) => {
                    drop(bootstrap);
                    let mut book = state.book.lock().expect("book mutex poisoned");
                    book.apply_batch(Side::Bid, bids);
                    book.apply_batch(Side::Ask, asks);
                    for (bid_updates, ask_updates) in batches {
                        book.apply_batch(Side::Bid, bid_updates);
                        book.apply_batch(Side::Ask, ask_updates);
                    }
                    tracing::info!(
                        "SUCCESS {} bootstrap complete (lastUpdateId={last_update_id})",
                        state.symbol
                    );
                    return;
                }
                None => {
                    tracing::warn!("WARN {} bootstrap ordering failed, restarting", state.symbol);
                    bootstrap.reset();
                    drop(bootstrap);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
            }
        }
    }

    fn handle_message(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        payload: &Value,
    ) -> bool {
        tracer.record("binance_message_received");

        let Some(data) = payload.get("data") else {
            tracing::warn!("WARN unknown binance message: {payload}");
            return true;
        };

        let Some(event_type) = data.get("e").and_then(Value::as_str) else {
            tracing::warn!("WARN binance message missing event type: {data}");
            return true;
        };

        match event_type {
            "depthUpdate" => Self::handle_depth_update(pairs, registry, store, tracer, data),
            "kline" => Self::handle_kline(pairs, registry, store, tracer, data),
            other => tracing::warn!("WARN unknown binance event type: {other}"),
        }

        true
    }

    fn handle_depth_update(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        update: &Value,
    ) {
        let Some(symbol) = get_str(update, &["s"]) else {
            tracing::warn!("WARN depthUpdate missing symbol: {update}");
            return;
        };
        let Some(state) = pairs.iter().find(|p| p.symbol == symbol) else {
            tracing::warn!("WARN depthUpdate for unrecognized symbol {symbol}");
            return;
        };

        let Some(buffered) = BufferedUpdate::from_json(update) else {
            tracing::warn!("WARN malformed depthUpdate: {update}");
            return;
        };

        let mut bootstrap = state.bootstrap.lock().expect("bootstrap mutex poisoned");
        if !bootstrap.is_live() {
            bootstrap.buffer_update(buffered);
            return;
        }

        if !bootstrap.apply_live(&buffered) {
            tracing::warn!("WARN update id gap for {symbol}, restarting bootstrap");
            bootstrap.reset();
            bootstrap.buffer_update(buffered);
            drop(bootstrap);
            tokio::spawn(Self::fetch_and_apply_snapshot(state.clone()));
            return;
        }
        drop(bootstrap);

        let bids = parse_levels(update.get("b").unwrap_or(&Value::Null));
        let asks = parse_levels(update.get("a").unwrap_or(&Value::Null));

        let mut book = state.book.lock().expect("book mutex poisoned");
        book.apply_batch(Side::Bid, bids);
        book.apply_batch(Side::Ask, asks);
        store.update(book.snapshot());
        tracer.record("binance_orders_dispatched");
        registry.dispatch(state.pair, ORDERS_UPDATED, &book);
    }

    fn handle_kline(
        pairs: &[Arc<PairState>],
        registry: &HandlerRegistry,
        store: &OrderBookStore,
        tracer: &Tracer,
        update: &Value,
    ) {
        let Some(symbol) = get_str(update, &["s"]) else {
            tracing::warn!("WARN kline missing symbol: {update}");
            return;
        };
        let Some(state) = pairs.iter().find(|p| p.symbol == symbol) else {
            tracing::warn!("WARN kline for unrecognized symbol {symbol}");
            return;
        };

        if parse_ticker_price(update).is_none() {
            tracing::warn!("WARN malformed kline close price: {update}");
        }

        let book = state.book.lock().expect("book mutex poisoned");
        store.update(book.snapshot());
        tracer.record("binance_ticker_dispatched");
        registry.dispatch(state.pair, TICKER_UPDATED, &book);
    }
}

impl MarketFeed for BinanceFeed {
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
        let uri = self.combined_stream_uri();
        let closer_slot = Arc::new(Mutex::new(None));
        let closer_slot_for_thread = closer_slot.clone();

        let handle = std::thread::Builder::new()
            .name("binance-feed".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build feed runtime");

                rt.block_on(async move {
                    for state in &pairs {
                        tokio::spawn(Self::fetch_and_apply_snapshot(state.clone()));
                    }

                    let pairs_for_cb = pairs.clone();
                    let registry_for_cb = registry.clone();
                    let store_for_cb = store.clone();
                    let tracer_for_cb = tracer.clone();
                    let on_message = move |payload: Value| -> bool {
                        Self::handle_message(&pairs_for_cb, &registry_for_cb, &store_for_cb, &tracer_for_cb, &payload)
                    };

                    let mut client = WsClient::new(uri, on_message);
                    *closer_slot_for_thread.lock().expect("closer slot poisoned") = Some(client.closer());
                    tracer.record("binance_ws_connecting");

                    if let Err(e) = client.connect().await {
                        tracing::error!("ERROR binance feed connection ended: {e}");
                    }
                });
            })
            .expect("failed to spawn binance feed thread");

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
