use std::sync::Arc;

use arbiter_core::adaptor::guarded::GuardedFeedAdaptor;
use arbiter_core::api::ApiServer;
use arbiter_core::benchmark::Tracer;
use arbiter_core::config::Config;
use arbiter_core::feed::binance::BinanceFeed;
use arbiter_core::feed::coinbase::CoinbaseFeed;
use arbiter_core::feed::{MarketFeed, ALL};
use arbiter_core::orderbook::OrderBook;
use arbiter_core::orderbook_store::OrderBookStore;
use arbiter_core::scoring::ScoringEngine;

/// A strategy that just logs a crossing book event; real strategies
/// implement `adaptor::Strategy` the same way.
struct LoggingStrategy;
impl arbiter_core::adaptor::Strategy for LoggingStrategy {
    fn feed_event_handler(&self, book: &OrderBook) -> bool {
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            tracing::debug!("[{:?}] {} best_bid={bid} best_ask={ask}", book.venue, book.pair);
        }
        true
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let store = OrderBookStore::new();
    let tracer = Arc::new(Tracer::new());

    tracing::info!("Arbiter starting — watching pairs: {:?} on port {}", config.pairs, config.api_port);

    let binance_feed = Arc::new(BinanceFeed::new(
        &config,
        config.binance_api_key.clone(),
        store.clone(),
        tracer.clone(),
    ));
    let coinbase_feed = Arc::new(CoinbaseFeed::new(
        &config,
        config.coinbase_api_key.clone(),
        config.coinbase_api_secret.clone(),
        store.clone(),
        tracer.clone(),
    ));

    let strategy = Arc::new(GuardedFeedAdaptor::new(LoggingStrategy));
    for pair in &config.pairs {
        binance_feed.register_event_handler(*pair, ALL, strategy.as_handler());
        coinbase_feed.register_event_handler(*pair, ALL, strategy.as_handler());
    }

    if let Err(e) = binance_feed.start_feed() {
        tracing::error!("ERROR failed to start binance feed: {e}");
    }
    if let Err(e) = coinbase_feed.start_feed() {
        tracing::error!("ERROR failed to start coinbase feed: {e}");
    }

    let scoring_engine = ScoringEngine::new(store.clone());
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            let opportunities = scoring_engine.compute_opportunities();
            tracing::info!("=== TOP OPPORTUNITIES ===");
            for opp in opportunities.iter().take(5) {
                tracing::info!(
                    "{}: sell {:?}@{} / buy {:?}@{} spread={:.6}%",
                    opp.pair,
                    opp.bid_venue,
                    ScoringEngine::format_price(opp.bid_price),
                    opp.ask_venue,
                    ScoringEngine::format_price(opp.ask_price),
                    opp.spread_pct,
                );
            }
        }
    });

    let api_engine = ScoringEngine::new(store.clone());
    let api_server = ApiServer::new(api_engine, store.clone());
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api_server.run(config).await {
            tracing::error!("ERROR api server failed on port {api_port}: {e}");
        }
    });

    tokio::signal::ctrl_c().await.unwrap();
    tracing::info!("Shutting down...");
    binance_feed.close();
    coinbase_feed.close();
    binance_feed.join();
    coinbase_feed.join();

    for (thread_id, entries) in tracer.snapshot() {
        tracing::debug!("thread {:?} recorded {} timeline entries", thread_id, entries.len());
    }
}
