//! Local Order Persistence
//!
//! Adapters for the `OrderStore` port. Writes are best-effort; the relay
//! behaves the same with or without a store.

mod in_memory;
mod json_lines;

pub use in_memory::InMemoryOrderStore;
pub use json_lines::JsonLinesOrderStore;
