pub mod multi;

pub use multi::{RequestBatch, RequestMethod, RequestSpec};
