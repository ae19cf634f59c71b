use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use super::{handlers, ApiState};

/// Builds and returns the full Axum router with all routes and shared state.
pub fn build(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/books", get(handlers::get_books))
        .route("/books/:venue/:pair", get(handlers::get_book))
        .route("/opportunities", get(handlers::get_opportunities))
        .with_state(state)
}
