//! HTTP Ingest Integration Tests
//!
//! Runs the pipeline against mock ingestion endpoints with the runtime
//! executor and local persistence, the way the binary wires it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use market_relay::application::dispatch::codes::{event, key, operation};
use market_relay::infrastructure::ingest::CORRELATION_ID_HEADER;
use market_relay::{
    CommandWriter, DecoderConfig, Dispatcher, HttpPublisher, JsonLinesOrderStore,
    MarketNormalizer, MarketPublisher, OrderStore, Parameters, ProtocolMessage, Relay,
    TaskExecutor, TokioExecutor, UploadFanout, Value,
};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORDER: &str = r#"{"Id":55,"ItemTypeId":"T6_ORE","UnitPriceSilver":310,"Amount":999,"AuctionType":"Offer"}"#;

fn stream() -> bytes::Bytes {
    let mut join = Parameters::new();
    join.insert(key::JOIN_LOCATION, Value::String("1002".into()));
    let mut snapshot = Parameters::new();
    snapshot.insert(
        key::ORDER_DOCUMENTS,
        Value::Array(vec![Value::String(ORDER.into()), Value::String(ORDER.into())]),
    );

    CommandWriter::new()
        .reliable(&ProtocolMessage::response(operation::JOIN, join))
        .reliable(&ProtocolMessage::event(event::MARKET_SNAPSHOT, snapshot))
        .finish()
}

#[tokio::test]
async fn batch_is_posted_to_healthy_destination_and_persisted() {
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/marketorders.ingest"))
        .and(header_exists(CORRELATION_ID_HEADER))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&healthy)
        .await;

    let rejecting = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&rejecting)
        .await;

    let timeout = Duration::from_secs(5);
    let publishers: Vec<Arc<dyn MarketPublisher>> = vec![
        Arc::new(HttpPublisher::new(&healthy.uri(), timeout).unwrap()) as Arc<dyn MarketPublisher>,
        Arc::new(HttpPublisher::new(&rejecting.uri(), timeout).unwrap()),
    ];
    let fanout = Arc::new(UploadFanout::new(publishers, "marketorders.ingest", timeout));

    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("orders.jsonl");
    let store: Arc<dyn OrderStore> = Arc::new(JsonLinesOrderStore::new(&store_path));

    let executor = Arc::new(TokioExecutor::new());
    let relay = Relay::new(
        DecoderConfig::default(),
        Dispatcher::with_market_handlers(),
        MarketNormalizer::new(
            fanout,
            Some(store),
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
        ),
    );

    let mut processor = relay.open_stream("replay", relay.new_session());
    processor.push_chunk(&stream());
    processor.finish();

    assert!(executor.shutdown(Duration::from_secs(10)).await);

    let requests = healthy.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let orders = body["Orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["LocationId"], "1002");
    assert_eq!(orders[0]["AuctionType"], "offer");

    let persisted = std::fs::read_to_string(&store_path).unwrap();
    assert_eq!(persisted.lines().count(), 2);
}
