use serde::Serialize;

use crate::orderbook::BookSnapshot;
use crate::scoring::Opportunity;

/// Response for GET /books
#[derive(Serialize)]
pub struct BooksResponse {
    pub books: Vec<BookSnapshot>,
}

/// Response for GET /books/:venue/:pair
#[derive(Serialize)]
pub struct BookResponse {
    pub book: BookSnapshot,
}

/// Response for GET /opportunities
#[derive(Serialize)]
pub struct OpportunitiesResponse {
    pub opportunities: Vec<Opportunity>,
}
