use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;

use crate::instrument::InstrumentPair;
use crate::orderbook::Venue;

use super::models::{BookResponse, BooksResponse, OpportunitiesResponse};
use super::ApiState;

/// GET /health — simple liveness check
pub async fn health() -> &'static str {
    "OK"
}

/// GET /books — every book currently held in the store
pub async fn get_books(State(state): State<Arc<ApiState>>) -> Json<BooksResponse> {
    Json(BooksResponse { books: state.store.all() })
}

/// GET /books/:venue/:pair — a specific venue's book for a pair, e.g.
/// `/books/binance/BTC-USD`.
pub async fn get_book(
    State(state): State<Arc<ApiState>>,
    Path((venue, pair)): Path<(String, String)>,
) -> Result<Json<BookResponse>, StatusCode> {
    let venue = match venue.to_ascii_lowercase().as_str() {
        "coinbase" => Venue::Coinbase,
        "binance" => Venue::Binance,
        _ => return Err(StatusCode::NOT_FOUND),
    };
    let Some((base, quote)) = pair.split_once('-') else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let pair = InstrumentPair::new(base, quote);

    state
        .store
        .get(venue, pair)
        .map(|book| Json(BookResponse { book }))
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /opportunities — cross-venue arbitrage opportunities, best first
pub async fn get_opportunities(State(state): State<Arc<ApiState>>) -> Json<OpportunitiesResponse> {
    Json(OpportunitiesResponse { opportunities: state.engine.compute_opportunities() })
}
