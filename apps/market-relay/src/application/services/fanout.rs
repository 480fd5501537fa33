//! Upload Fan-out
//!
//! Publishes one batch to every configured destination at once. Each
//! destination gets its own timeout; a failure is logged with the
//! destination and correlation id and affects nothing else. Failed publishes
//! are dropped, not retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::application::ports::{MarketPublisher, PublishError};
use crate::domain::market::{CorrelationId, MarketUploadBatch};
use crate::infrastructure::metrics::{self, PublishOutcome};

/// Per-destination results of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    /// Batch correlation id.
    pub correlation_id: CorrelationId,
    /// Destinations that accepted the batch.
    pub delivered: Vec<String>,
    /// Destinations that failed, with the reason.
    pub failed: Vec<(String, PublishError)>,
}

impl FanoutReport {
    /// At least one destination failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Some destinations succeeded and some failed.
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty() && !self.delivered.is_empty()
    }

    /// Every destination accepted the batch.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Concurrent publisher over all ingestion destinations.
pub struct UploadFanout {
    publishers: Vec<Arc<dyn MarketPublisher>>,
    subject: String,
    timeout: Duration,
}

impl UploadFanout {
    /// Create a fan-out over `publishers` on `subject`.
    #[must_use]
    pub fn new(
        publishers: Vec<Arc<dyn MarketPublisher>>,
        subject: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            publishers,
            subject: subject.into(),
            timeout,
        }
    }

    /// Number of destinations.
    #[must_use]
    pub fn destinations(&self) -> usize {
        self.publishers.len()
    }

    /// Subject batches are published on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    async fn publish_one(
        &self,
        publisher: &dyn MarketPublisher,
        batch: &MarketUploadBatch,
    ) -> Result<(), PublishError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, publisher.publish(&self.subject, batch))
            .await
            .unwrap_or_else(|_| {
                Err(PublishError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            });

        let outcome = match &result {
            Ok(()) => PublishOutcome::Delivered,
            Err(PublishError::Timeout { .. }) => PublishOutcome::TimedOut,
            Err(_) => PublishOutcome::Failed,
        };
        metrics::record_publish(publisher.destination(), outcome, started.elapsed());
        result
    }

    /// Publish `batch` to every destination and wait for all attempts.
    pub async fn publish(&self, batch: &MarketUploadBatch) -> FanoutReport {
        let correlation_id = batch.correlation_id();
        let mut report = FanoutReport {
            correlation_id,
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        if self.publishers.is_empty() {
            debug!(correlation_id = %correlation_id, "No ingest destinations configured");
            return report;
        }

        let attempts = self.publishers.iter().map(|publisher| async move {
            let result = self.publish_one(publisher.as_ref(), batch).await;
            (publisher.destination().to_string(), result)
        });

        for (destination, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    debug!(
                        destination = %destination,
                        correlation_id = %correlation_id,
                        orders = batch.len(),
                        "Batch delivered"
                    );
                    report.delivered.push(destination);
                }
                Err(e) => {
                    warn!(
                        destination = %destination,
                        correlation_id = %correlation_id,
                        error = %e,
                        "Failed to publish batch"
                    );
                    report.failed.push((destination, e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::market::{AuctionType, LocationId, MarketOrder};
    use crate::infrastructure::ingest::InMemoryPublisher;

    struct SlowPublisher;

    #[async_trait]
    impl MarketPublisher for SlowPublisher {
        fn destination(&self) -> &str {
            "slow"
        }

        async fn publish(
            &self,
            _subject: &str,
            _batch: &MarketUploadBatch,
        ) -> Result<(), PublishError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn batch() -> MarketUploadBatch {
        let order = MarketOrder {
            order_id: 1,
            item_id: "T4_BAG".into(),
            item_group_id: None,
            location_id: LocationId::new("3005").unwrap(),
            quality_level: 1,
            enchantment_level: 0,
            price: 10,
            amount: 1,
            auction_type: AuctionType::Offer,
            expires: String::new(),
        };
        MarketUploadBatch::new(CorrelationId::new_v4(), vec![order])
    }

    #[tokio::test]
    async fn failing_destination_does_not_affect_others() {
        let a = Arc::new(InMemoryPublisher::failing("a"));
        let b = Arc::new(InMemoryPublisher::new("b"));
        let fanout = UploadFanout::new(
            vec![a.clone() as Arc<dyn MarketPublisher>, b.clone()],
            "marketorders.ingest",
            Duration::from_secs(1),
        );

        let batch = batch();
        let report = fanout.publish(&batch).await;

        assert!(report.is_partial_failure());
        assert_eq!(report.delivered, vec!["b".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a");
        assert_eq!(b.batches(), vec![batch.clone()]);
        assert_eq!(b.subjects(), vec!["marketorders.ingest".to_string()]);
        assert!(a.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_destination_times_out() {
        let fast = Arc::new(InMemoryPublisher::new("fast"));
        let fanout = UploadFanout::new(
            vec![Arc::new(SlowPublisher) as Arc<dyn MarketPublisher>, fast.clone()],
            "subject",
            Duration::from_millis(50),
        );

        let report = fanout.publish(&batch()).await;
        assert_eq!(report.delivered, vec!["fast".to_string()]);
        assert_eq!(
            report.failed,
            vec![("slow".to_string(), PublishError::Timeout { timeout_ms: 50 })]
        );
    }

    #[tokio::test]
    async fn no_destinations_is_not_an_error() {
        let fanout = UploadFanout::new(Vec::new(), "subject", Duration::from_secs(1));
        let report = fanout.publish(&batch()).await;
        assert!(report.all_delivered());
        assert!(report.delivered.is_empty());
    }
}
