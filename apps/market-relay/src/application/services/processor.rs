//! Stream Processor
//!
//! Pipeline root for one connection/direction. Decode and dispatch run
//! strictly in arrival order on the caller's task; handler side effects go
//! to the executor so downstream latency never holds up decoding.
//!
//! ```text
//! StreamChunk ─▶ buffer ─▶ FrameDecoder ─▶ Dispatcher ─▶ Handler
//!                                                          │
//!                                  SessionState ◀──────────┤
//!                                  MarketNormalizer ◀──────┘
//! ```

use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::normalizer::MarketNormalizer;
use super::stats::PipelineStats;
use crate::application::dispatch::{DispatchOutcome, Dispatcher, HandlerContext, HandlerOutcome};
use crate::application::ports::StreamChunk;
use crate::domain::session::SessionState;
use crate::infrastructure::metrics;
use crate::infrastructure::protocol::{DecoderConfig, Frame, FrameDecoder, FrameError};

/// Unrecoverable pipeline failure, surfaced to the process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The byte-stream source went away without signalling end-of-stream.
    #[error("byte stream {stream} closed without end-of-stream")]
    SourceClosed {
        /// Stream label.
        stream: String,
    },
}

/// Something the processor did with one decoded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A message was routed.
    Dispatched(DispatchOutcome),
    /// A command or message failed to decode and was skipped.
    DecodeError(FrameError),
    /// The peer disconnected; session reset.
    Disconnected,
    /// A connection handshake was seen; session reset.
    Reconnected,
}

/// Sequential decode-and-dispatch loop for one stream.
pub struct StreamProcessor {
    label: String,
    buffer: BytesMut,
    decoder: FrameDecoder,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionState>,
    normalizer: Arc<MarketNormalizer>,
    stats: Arc<PipelineStats>,
    location_known: bool,
}

impl StreamProcessor {
    /// Create a processor bound to `session`.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        config: DecoderConfig,
        dispatcher: Arc<Dispatcher>,
        session: Arc<SessionState>,
        normalizer: Arc<MarketNormalizer>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        stats.stream_opened();
        stats.track_session(&session);
        let location_known = session.is_valid_location();
        Self {
            label: label.into(),
            buffer: BytesMut::new(),
            decoder: FrameDecoder::new(config),
            dispatcher,
            session,
            normalizer,
            stats,
            location_known,
        }
    }

    /// Stream label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Session this stream reads and updates.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Decode and dispatch everything completed by `chunk`. Partial trailing
    /// bytes stay buffered for the next call.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<PipelineEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(item)) => events.push(self.handle(item)),
                Ok(None) => break,
                Err(e) => {
                    warn!(stream = %self.label, error = %e, "Decoder failed, discarding buffer");
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// End of stream: flush the decoder and reset the session.
    pub fn finish(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        loop {
            match self.decoder.decode_eof(&mut self.buffer) {
                Ok(Some(item)) => events.push(self.handle(item)),
                Ok(None) => break,
                Err(e) => {
                    warn!(stream = %self.label, error = %e, "Decoder failed at end of stream");
                    self.buffer.clear();
                    break;
                }
            }
        }
        self.session.reset();
        self.refresh_location();
        events
    }

    /// Consume chunks until end-of-stream or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceClosed`] if the channel closes without
    /// a [`StreamChunk::End`].
    pub async fn run(
        &mut self,
        mut chunks: mpsc::Receiver<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        info!(stream = %self.label, "Stream processor started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(stream = %self.label, "Stream processor cancelled");
                    self.finish();
                    return Ok(());
                }
                chunk = chunks.recv() => match chunk {
                    Some(StreamChunk::Data(bytes)) => {
                        self.push_chunk(&bytes);
                    }
                    Some(StreamChunk::End) => {
                        info!(stream = %self.label, "End of stream");
                        self.finish();
                        return Ok(());
                    }
                    None => {
                        self.finish();
                        return Err(PipelineError::SourceClosed {
                            stream: self.label.clone(),
                        });
                    }
                },
            }
        }
    }

    fn handle(&mut self, item: Result<Frame, FrameError>) -> PipelineEvent {
        let event = match item {
            Ok(Frame::Message(message)) => {
                self.stats.record_frame();
                metrics::record_frame_decoded(message.kind);

                let ctx = HandlerContext {
                    session: &self.session,
                    normalizer: &self.normalizer,
                };
                let outcome = self.dispatcher.dispatch(&message, &ctx);
                self.record_outcome(&outcome);
                PipelineEvent::Dispatched(outcome)
            }
            Ok(Frame::Disconnect) => {
                info!(stream = %self.label, "Peer disconnected, session reset");
                self.session.reset();
                PipelineEvent::Disconnected
            }
            Ok(Frame::Reconnect) => {
                info!(stream = %self.label, "Connection handshake seen, session reset");
                self.session.reset();
                PipelineEvent::Reconnected
            }
            Err(e) => {
                self.stats.record_frame_error();
                metrics::record_frame_error(e.kind());
                match e {
                    FrameError::Encrypted | FrameError::UnknownMessageType(_) => {
                        debug!(stream = %self.label, error = %e, "Skipping undecodable message");
                    }
                    _ => warn!(stream = %self.label, error = %e, "Frame decode error"),
                }
                PipelineEvent::DecodeError(e)
            }
        };
        self.refresh_location();
        event
    }

    fn record_outcome(&self, outcome: &DispatchOutcome) {
        let DispatchOutcome::Handled { outcome, .. } = outcome else {
            self.stats.record_dispatch(false);
            metrics::record_message_dispatched(false);
            return;
        };
        self.stats.record_dispatch(true);
        metrics::record_message_dispatched(true);

        match outcome {
            HandlerOutcome::Forwarded {
                orders, rejected, ..
            } => {
                self.stats.record_batch(*orders);
                self.stats.record_rejected(*rejected);
                metrics::record_orders(*orders, *rejected);
                metrics::record_batch_submitted();
            }
            HandlerOutcome::NoValidOrders { rejected } => {
                self.stats.record_rejected(*rejected);
                metrics::record_orders(0, *rejected);
            }
            HandlerOutcome::InvalidSession => metrics::record_invalid_session_drop(),
            HandlerOutcome::LocationEstablished(_)
            | HandlerOutcome::LocationUnconfirmed
            | HandlerOutcome::LocationInvalidated => {}
        }
    }

    fn refresh_location(&mut self) {
        let known = self.session.is_valid_location();
        if known == self.location_known {
            return;
        }
        self.location_known = known;
        metrics::set_session_valid(&self.label, known);
    }
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        self.stats.stream_closed();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::dispatch::codes::{event, operation};
    use crate::application::ports::MarketPublisher;
    use crate::application::services::UploadFanout;
    use crate::domain::protocol::{Parameters, ProtocolMessage, Value};
    use crate::infrastructure::executor::DeferredExecutor;
    use crate::infrastructure::ingest::InMemoryPublisher;
    use crate::infrastructure::protocol::CommandWriter;

    struct Harness {
        processor: StreamProcessor,
        executor: Arc<DeferredExecutor>,
        publisher: Arc<InMemoryPublisher>,
        stats: Arc<PipelineStats>,
    }

    fn harness() -> Harness {
        let publisher = Arc::new(InMemoryPublisher::new("primary"));
        let executor = Arc::new(DeferredExecutor::new());
        let fanout = Arc::new(UploadFanout::new(
            vec![publisher.clone() as Arc<dyn MarketPublisher>],
            "marketorders.ingest",
            Duration::from_secs(1),
        ));
        let normalizer = Arc::new(MarketNormalizer::new(fanout, None, executor.clone()));
        let stats = Arc::new(PipelineStats::new());
        let processor = StreamProcessor::new(
            "test",
            DecoderConfig::default(),
            Arc::new(Dispatcher::with_market_handlers()),
            Arc::new(SessionState::new()),
            normalizer,
            stats.clone(),
        );
        Harness {
            processor,
            executor,
            publisher,
            stats,
        }
    }

    fn join(location: &str) -> ProtocolMessage {
        let mut params = Parameters::new();
        params.insert(8, Value::String(location.into()));
        ProtocolMessage::response(operation::JOIN, params)
    }

    fn snapshot(docs: &[&str]) -> ProtocolMessage {
        let mut params = Parameters::new();
        params.insert(
            0,
            Value::Array(docs.iter().map(|d| Value::String((*d).to_string())).collect()),
        );
        ProtocolMessage::event(event::MARKET_SNAPSHOT, params)
    }

    const ORDER: &str = r#"{"Id":7,"ItemTypeId":"T4_BAG","UnitPriceSilver":100,"Amount":1,"AuctionType":"offer"}"#;

    #[tokio::test]
    async fn market_data_before_location_is_dropped() {
        let mut h = harness();
        let bytes = CommandWriter::new().reliable(&snapshot(&[ORDER])).finish();
        let events = h.processor.push_chunk(&bytes);

        assert!(matches!(
            events.as_slice(),
            [PipelineEvent::Dispatched(DispatchOutcome::Handled {
                outcome: HandlerOutcome::InvalidSession,
                ..
            })]
        ));
        assert_eq!(h.executor.pending(), 0);
        h.executor.run_pending().await;
        assert!(h.publisher.batches().is_empty());
    }

    #[tokio::test]
    async fn location_then_snapshot_is_forwarded() {
        let mut h = harness();
        let bytes = CommandWriter::new()
            .reliable(&join("3005"))
            .reliable(&snapshot(&[ORDER, ORDER]))
            .finish();
        h.processor.push_chunk(&bytes);
        assert!(h.processor.session().is_valid_location());
        assert!(h.stats.any_session_known());

        h.executor.run_pending().await;
        let batches = h.publisher.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].orders().iter().all(|o| o.location_id.as_str() == "3005"));

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.frames_decoded, 2);
        assert_eq!(snapshot.orders_forwarded, 2);
        assert_eq!(snapshot.batches_submitted, 1);
    }

    #[tokio::test]
    async fn cluster_change_invalidates_until_confirmed() {
        let mut h = harness();
        let change = ProtocolMessage::request(operation::CHANGE_CLUSTER, Parameters::new());
        let mut confirmed = Parameters::new();
        confirmed.insert(0, Value::String("0007".into()));

        h.processor
            .push_chunk(&CommandWriter::new().reliable(&join("3005")).finish());
        assert!(h.processor.session().is_valid_location());

        h.processor
            .push_chunk(&CommandWriter::new().reliable(&change).finish());
        assert!(!h.processor.session().is_valid_location());
        assert!(!h.stats.any_session_known());

        let bytes = CommandWriter::new()
            .reliable(&ProtocolMessage::event(event::CLUSTER_CHANGED, confirmed))
            .finish();
        h.processor.push_chunk(&bytes);
        assert_eq!(
            h.processor.session().location().unwrap().as_str(),
            "0007"
        );
    }

    #[tokio::test]
    async fn disconnect_resets_session() {
        let mut h = harness();
        let bytes = CommandWriter::new()
            .reliable(&join("3005"))
            .disconnect()
            .finish();
        let events = h.processor.push_chunk(&bytes);
        assert_eq!(events.last(), Some(&PipelineEvent::Disconnected));
        assert!(!h.processor.session().is_valid_location());
    }

    #[tokio::test]
    async fn reconnect_resets_session() {
        let mut h = harness();
        let bytes = CommandWriter::new()
            .reliable(&join("3005"))
            .connect()
            .finish();
        let events = h.processor.push_chunk(&bytes);
        assert_eq!(events.last(), Some(&PipelineEvent::Reconnected));
        assert!(!h.processor.session().is_valid_location());
        assert!(!h.stats.any_session_known());
    }

    #[tokio::test]
    async fn run_reports_source_closed_without_end() {
        let mut h = harness();
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamChunk::data(CommandWriter::new().reliable(&join("3005")).finish()))
            .await
            .unwrap();
        drop(tx);

        let result = h.processor.run(rx, CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(PipelineError::SourceClosed {
                stream: "test".into()
            })
        );
        assert!(!h.processor.session().is_valid_location());
    }

    #[tokio::test]
    async fn run_stops_on_end_of_stream() {
        let mut h = harness();
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamChunk::End).await.unwrap();
        assert_eq!(h.processor.run(rx, CancellationToken::new()).await, Ok(()));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let mut h = harness();
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(h.processor.run(rx, cancel).await, Ok(()));
    }
}
