//! Pipeline Integration Tests
//!
//! Drives encoded command streams through a stream processor and checks what
//! reaches the ingestion destinations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use market_relay::application::dispatch::codes::{event, key, operation};
use market_relay::{
    CommandWriter, DecoderConfig, DeferredExecutor, DispatchOutcome, Dispatcher, FrameError,
    HandlerOutcome, InMemoryOrderStore, InMemoryPublisher, MarketNormalizer, MarketPublisher,
    OrderStore, Parameters, PipelineEvent, PipelineStats, ProtocolMessage, Relay, SessionState,
    StreamChunk, StreamProcessor, UploadFanout, Value,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SUBJECT: &str = "marketorders.ingest";

struct Harness {
    processor: StreamProcessor,
    executor: Arc<DeferredExecutor>,
    destinations: Vec<Arc<InMemoryPublisher>>,
    failing: Arc<InMemoryPublisher>,
    store: Arc<InMemoryOrderStore>,
}

fn harness() -> Harness {
    let destinations = vec![
        Arc::new(InMemoryPublisher::new("primary")),
        Arc::new(InMemoryPublisher::new("secondary")),
    ];
    let failing = Arc::new(InMemoryPublisher::failing("broken"));

    let mut publishers: Vec<Arc<dyn MarketPublisher>> = destinations
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn MarketPublisher>)
        .collect();
    publishers.push(failing.clone());

    let executor = Arc::new(DeferredExecutor::new());
    let store = Arc::new(InMemoryOrderStore::new());
    let fanout = Arc::new(UploadFanout::new(publishers, SUBJECT, Duration::from_secs(1)));
    let normalizer = Arc::new(MarketNormalizer::new(
        fanout,
        Some(store.clone() as Arc<dyn OrderStore>),
        executor.clone(),
    ));
    let processor = StreamProcessor::new(
        "client->server",
        DecoderConfig::default(),
        Arc::new(Dispatcher::with_market_handlers()),
        Arc::new(SessionState::new()),
        normalizer,
        Arc::new(PipelineStats::new()),
    );

    Harness {
        processor,
        executor,
        destinations,
        failing,
        store,
    }
}

fn join(location: &str) -> ProtocolMessage {
    let mut params = Parameters::new();
    params.insert(key::JOIN_LOCATION, Value::String(location.to_string()));
    ProtocolMessage::response(operation::JOIN, params)
}

fn snapshot(documents: &[&str]) -> ProtocolMessage {
    let mut params = Parameters::new();
    params.insert(
        key::ORDER_DOCUMENTS,
        Value::Array(
            documents
                .iter()
                .map(|d| Value::String((*d).to_string()))
                .collect(),
        ),
    );
    ProtocolMessage::event(event::MARKET_SNAPSHOT, params)
}

fn offers(documents: &[&str]) -> ProtocolMessage {
    let mut params = Parameters::new();
    params.insert(
        key::ORDER_DOCUMENTS,
        Value::Array(documents.iter().map(|d| Value::Bytes(d.as_bytes().to_vec())).collect()),
    );
    ProtocolMessage::response(operation::AUCTION_GET_OFFERS, params)
}

const OFFER: &str = r#"{"Id":101,"ItemTypeId":"T5_MAIN_SWORD","UnitPriceSilver":52000,"Amount":1,"AuctionType":"offer","QualityLevel":2,"EnchantmentLevel":1,"Expires":"2026-11-01T12:00:00"}"#;
const REQUEST: &str = r#"{"Id":102,"ItemTypeId":"T4_HIDE","UnitPriceSilver":90,"Amount":250,"AuctionType":"request","LocationId":"0007"}"#;
const NO_PRICE: &str = r#"{"Id":103,"ItemTypeId":"T4_HIDE","Amount":10,"AuctionType":"request"}"#;

fn forwarded(events: &[PipelineEvent]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Dispatched(DispatchOutcome::Handled {
                outcome: HandlerOutcome::Forwarded {
                    orders, rejected, ..
                },
                ..
            }) => Some((*orders, *rejected)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn snapshot_reaches_every_destination_with_session_location() {
    let mut h = harness();
    let bytes = CommandWriter::new()
        .reliable(&join("3005"))
        .reliable(&snapshot(&[OFFER, NO_PRICE, REQUEST]))
        .finish();

    let events = h.processor.push_chunk(&bytes);
    assert_eq!(forwarded(&events), vec![(2, 1)]);

    h.executor.run_pending().await;

    let primary = h.destinations[0].batches();
    let secondary = h.destinations[1].batches();
    assert_eq!(primary.len(), 1);
    assert_eq!(primary, secondary);
    assert!(h.failing.batches().is_empty());

    let batch = &primary[0];
    assert_eq!(batch.len(), 2);
    assert!(
        batch
            .orders()
            .iter()
            .all(|order| order.location_id.as_str() == "3005")
    );
    assert_eq!(batch.orders()[0].order_id, 101);
    assert_eq!(batch.orders()[1].order_id, 102);
    assert_eq!(h.destinations[0].subjects(), vec![SUBJECT.to_string()]);
    assert_eq!(h.store.orders(), batch.orders());
}

#[tokio::test]
async fn replayed_stream_gets_fresh_correlation_ids() {
    let mut h = harness();
    let bytes = CommandWriter::new()
        .reliable(&join("3005"))
        .reliable(&offers(&[OFFER]))
        .finish();

    h.processor.push_chunk(&bytes);
    h.processor.push_chunk(&bytes);
    h.executor.run_pending().await;

    let batches = h.destinations[0].batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].orders(), batches[1].orders());
    assert_ne!(batches[0].correlation_id(), batches[1].correlation_id());
}

#[tokio::test]
async fn malformed_message_between_good_ones_is_skipped() {
    let mut h = harness();

    let mut writer = CommandWriter::new();
    writer.reliable(&join("3005"));
    // Reliable command whose payload has the wrong signature.
    writer.raw(&[6, 0, 0, 0, 0, 0, 0, 15, 0, 0, 0, 99, 0x00, 4, 1]);
    writer.reliable(&snapshot(&[OFFER]));
    let bytes = writer.finish();

    let events = h.processor.push_chunk(&bytes);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[1],
        PipelineEvent::DecodeError(FrameError::InvalidSignature(0x00))
    );
    assert_eq!(forwarded(&events), vec![(1, 0)]);

    h.executor.run_pending().await;
    assert_eq!(h.destinations[0].batches().len(), 1);
}

#[tokio::test]
async fn fragmented_snapshot_fed_byte_by_byte_is_forwarded() {
    let mut h = harness();
    let documents: Vec<&str> = std::iter::repeat_n(OFFER, 20).collect();
    let bytes = CommandWriter::new()
        .reliable(&join("4002"))
        .fragmented(&snapshot(&documents), 300)
        .finish();

    let mut events = Vec::new();
    for byte in bytes.iter() {
        events.extend(h.processor.push_chunk(std::slice::from_ref(byte)));
    }
    assert_eq!(forwarded(&events), vec![(20, 0)]);

    h.executor.run_pending().await;
    let batches = h.destinations[1].batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 20);
    assert_eq!(batches[0].orders()[0].location_id.as_str(), "4002");
}

#[tokio::test]
async fn market_data_after_disconnect_is_dropped() {
    let mut h = harness();
    let bytes = CommandWriter::new()
        .reliable(&join("3005"))
        .disconnect()
        .reliable(&snapshot(&[OFFER]))
        .finish();

    let events = h.processor.push_chunk(&bytes);
    assert!(events.contains(&PipelineEvent::Disconnected));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Dispatched(DispatchOutcome::Handled {
            outcome: HandlerOutcome::InvalidSession,
            ..
        }))
    ));

    h.executor.run_pending().await;
    assert!(h.destinations[0].batches().is_empty());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn market_data_after_reconnect_is_dropped() {
    let mut h = harness();
    let bytes = CommandWriter::new()
        .reliable(&join("3005"))
        .connect()
        .reliable(&snapshot(&[OFFER]))
        .finish();

    let events = h.processor.push_chunk(&bytes);
    assert!(events.contains(&PipelineEvent::Reconnected));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Dispatched(DispatchOutcome::Handled {
            outcome: HandlerOutcome::InvalidSession,
            ..
        }))
    ));

    h.executor.run_pending().await;
    assert!(h.destinations[0].batches().is_empty());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn relay_streams_share_a_session() {
    let publisher = Arc::new(InMemoryPublisher::new("primary"));
    let executor = Arc::new(DeferredExecutor::new());
    let fanout = Arc::new(UploadFanout::new(
        vec![publisher.clone() as Arc<dyn MarketPublisher>],
        SUBJECT,
        Duration::from_secs(1),
    ));
    let relay = Relay::new(
        DecoderConfig::default(),
        Dispatcher::with_market_handlers(),
        MarketNormalizer::new(fanout, None, executor.clone()),
    );

    let session = relay.new_session();
    let mut outbound = relay.open_stream("client->server", Arc::clone(&session));
    let (tx, rx) = mpsc::channel(8);
    let inbound = relay.spawn_stream(
        "server->client",
        Arc::clone(&session),
        rx,
        CancellationToken::new(),
    );

    // The location arrives on the inbound stream.
    tx.send(StreamChunk::Data(
        CommandWriter::new().reliable(&join("3005")).finish(),
    ))
    .await
    .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !session.is_valid_location() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    // Orders seen on the other direction are stamped with it.
    let events = outbound.push_chunk(&CommandWriter::new().reliable(&offers(&[REQUEST])).finish());
    assert_eq!(forwarded(&events), vec![(1, 0)]);

    tx.send(StreamChunk::End).await.unwrap();
    assert_eq!(inbound.await.unwrap(), Ok(()));

    executor.run_pending().await;
    let batches = publisher.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].orders()[0].location_id.as_str(), "3005");
    assert_eq!(relay.stats().snapshot().batches_submitted, 1);
}
