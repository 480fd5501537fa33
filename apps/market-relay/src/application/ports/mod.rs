//! Port Interfaces
//!
//! Contracts between the decode pipeline and the outside world. Adapters in
//! the infrastructure layer implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketPublisher`: Sends upload batches to one ingestion destination
//! - `OrderStore`: Best-effort local persistence of single orders
//! - `TaskExecutor`: Runs fire-and-forget side effects off the decode loop
//!
//! ## Driver Ports (Inbound)
//!
//! - `StreamChunk`: Ordered byte chunks from the flow reassembler

mod executor_port;
mod order_store_port;
mod publisher_port;
mod stream_port;

pub use executor_port::TaskExecutor;
#[cfg(test)]
pub use order_store_port::MockOrderStore;
pub use order_store_port::{OrderStore, StoreError};
pub use publisher_port::{MarketPublisher, PublishError};
pub use stream_port::StreamChunk;
