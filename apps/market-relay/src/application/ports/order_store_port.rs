//! Order Store Port (Driven Port)
//!
//! Best-effort local persistence. Failures are logged by the caller and
//! never affect uploading or decoding.

use async_trait::async_trait;

use crate::domain::market::MarketOrder;

/// Local persistence error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("Order store I/O error: {message}")]
    Io { message: String },

    /// Record could not be encoded.
    #[error("Order serialization error: {message}")]
    Serialization { message: String },
}

/// Port for persisting observed orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist one order.
    async fn save(&self, order: MarketOrder) -> Result<(), StoreError>;
}

