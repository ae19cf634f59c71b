//! Introspection HTTP API (§4.8): read-only views over the order book
//! store and the scoring engine's live opportunities.

pub mod handlers;
pub mod models;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::orderbook_store::OrderBookStore;
use crate::scoring::ScoringEngine;

pub struct ApiState {
    engine: ScoringEngine,
    store: OrderBookStore,
}

pub struct ApiServer {
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(engine: ScoringEngine, store: OrderBookStore) -> Self {
        Self { state: Arc::new(ApiState { engine, store }) }
    }

    /// Binds the server to the configured port and starts serving.
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let app = router::build(Arc::clone(&self.state));
        let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));

        tracing::info!("API server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
