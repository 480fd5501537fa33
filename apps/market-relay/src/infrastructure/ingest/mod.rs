//! Ingestion Publishers
//!
//! Adapters for the `MarketPublisher` port.

mod http;
mod in_memory;

pub use http::{CORRELATION_ID_HEADER, HttpPublisher};
pub use in_memory::InMemoryPublisher;
