//! In-memory publisher for tests and dry runs.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{MarketPublisher, PublishError};
use crate::domain::market::MarketUploadBatch;

/// Records every batch it receives; can be set to fail every publish.
#[derive(Debug)]
pub struct InMemoryPublisher {
    name: String,
    fail: bool,
    received: RwLock<Vec<(String, MarketUploadBatch)>>,
}

impl InMemoryPublisher {
    /// Publisher that accepts everything.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            received: RwLock::new(Vec::new()),
        }
    }

    /// Publisher that refuses everything.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// Batches received so far.
    #[must_use]
    pub fn batches(&self) -> Vec<MarketUploadBatch> {
        self.received.read().iter().map(|(_, b)| b.clone()).collect()
    }

    /// Subjects received so far.
    #[must_use]
    pub fn subjects(&self) -> Vec<String> {
        self.received.read().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl MarketPublisher for InMemoryPublisher {
    fn destination(&self) -> &str {
        &self.name
    }

    async fn publish(&self, subject: &str, batch: &MarketUploadBatch) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Connection {
                message: format!("{} is configured to fail", self.name),
            });
        }
        self.received
            .write()
            .push((subject.to_string(), batch.clone()));
        Ok(())
    }
}
