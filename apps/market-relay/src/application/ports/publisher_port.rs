//! Market Publisher Port (Driven Port)
//!
//! One implementation per ingestion destination. A publish is a single
//! attempt; there is no retry at this layer.

use async_trait::async_trait;

use crate::domain::market::MarketUploadBatch;

/// Publish failure for one destination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// No response within the publish timeout.
    #[error("Publish timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Destination could not be reached.
    #[error("Publish connection error: {message}")]
    Connection { message: String },

    /// Destination answered with a non-success status.
    #[error("Publish rejected with status {status}")]
    Rejected { status: u16 },

    /// Batch could not be encoded.
    #[error("Batch serialization error: {message}")]
    Serialization { message: String },
}

impl PublishError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Rejected { .. } => "rejected",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Port for sending upload batches to one ingestion destination.
#[async_trait]
pub trait MarketPublisher: Send + Sync {
    /// Destination name used in logs and metrics.
    fn destination(&self) -> &str;

    /// Send one batch on the given subject.
    async fn publish(&self, subject: &str, batch: &MarketUploadBatch) -> Result<(), PublishError>;
}
