//! HTTP ingestion publisher.
//!
//! Each batch is one `POST {base}/{subject}` with the JSON payload as body and
//! the correlation id in a header. A single attempt is made.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::application::ports::{MarketPublisher, PublishError};
use crate::domain::market::MarketUploadBatch;

/// Header carrying the batch correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Publisher for one HTTP ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: Client,
    base_url: String,
}

impl HttpPublisher {
    /// Create a publisher for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Connection`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, subject: &str) -> String {
        format!("{}/{}", self.base_url, subject.trim_start_matches('/'))
    }
}

#[async_trait]
impl MarketPublisher for HttpPublisher {
    fn destination(&self) -> &str {
        &self.base_url
    }

    async fn publish(&self, subject: &str, batch: &MarketUploadBatch) -> Result<(), PublishError> {
        let body =
            serde_json::to_vec(&batch.payload()).map_err(|e| PublishError::Serialization {
                message: e.to_string(),
            })?;

        let response = self
            .client
            .post(self.url(subject))
            .header(CONTENT_TYPE, "application/json")
            .header(CORRELATION_ID_HEADER, batch.correlation_id().to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::trace!(
            destination = %self.base_url,
            correlation_id = %batch.correlation_id(),
            "Ingest accepted batch"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::market::{AuctionType, CorrelationId, LocationId, MarketOrder};

    fn batch() -> MarketUploadBatch {
        let order = MarketOrder {
            order_id: 42,
            item_id: "T6_SWORD".into(),
            item_group_id: Some("T6_SWORD".into()),
            location_id: LocationId::new("3005").unwrap(),
            quality_level: 1,
            enchantment_level: 2,
            price: 99_000,
            amount: 1,
            auction_type: AuctionType::Request,
            expires: "2026-11-30T12:00:00".into(),
        };
        MarketUploadBatch::new(CorrelationId::new_v4(), vec![order])
    }

    #[tokio::test]
    async fn posts_payload_with_correlation_header() {
        let server = MockServer::start().await;
        let batch = batch();

        Mock::given(method("POST"))
            .and(path("/marketorders.ingest"))
            .and(header(
                CORRELATION_ID_HEADER,
                batch.correlation_id().to_string().as_str(),
            ))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(&server.uri(), Duration::from_secs(5)).unwrap();
        publisher.publish("marketorders.ingest", &batch).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["Orders"][0]["Id"], 42);
        assert_eq!(body["Orders"][0]["LocationId"], "3005");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let err = publisher.publish("orders", &batch()).await.unwrap_err();
        assert_eq!(err, PublishError::Rejected { status: 503 });
    }

    #[tokio::test]
    async fn unreachable_destination_is_connection_error() {
        let publisher = HttpPublisher::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = publisher.publish("orders", &batch()).await.unwrap_err();
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn destination_drops_trailing_slash() {
        let publisher = HttpPublisher::new("http://ingest.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(publisher.destination(), "http://ingest.local");
        assert_eq!(publisher.url("a.b"), "http://ingest.local/a.b");
    }
}
