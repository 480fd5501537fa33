//! Relay
//!
//! Owns the pieces shared by every observed stream (handler registry,
//! normalizer, counters) and opens one [`StreamProcessor`] per
//! connection/direction. Sessions are created per observed game session and
//! passed in explicitly, so unrelated connections never share state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::normalizer::MarketNormalizer;
use super::processor::{PipelineError, StreamProcessor};
use super::stats::PipelineStats;
use crate::application::dispatch::Dispatcher;
use crate::application::ports::StreamChunk;
use crate::domain::session::SessionState;
use crate::infrastructure::protocol::DecoderConfig;

/// Multi-stream pipeline owner.
pub struct Relay {
    config: DecoderConfig,
    dispatcher: Arc<Dispatcher>,
    normalizer: Arc<MarketNormalizer>,
    stats: Arc<PipelineStats>,
}

impl Relay {
    /// Create a relay.
    #[must_use]
    pub fn new(config: DecoderConfig, dispatcher: Dispatcher, normalizer: MarketNormalizer) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            normalizer: Arc::new(normalizer),
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Counters shared by all streams.
    #[must_use]
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Fresh session in the `Unknown` phase.
    #[must_use]
    pub fn new_session(&self) -> Arc<SessionState> {
        Arc::new(SessionState::new())
    }

    /// Open a processor for one connection/direction of `session`.
    #[must_use]
    pub fn open_stream(&self, label: impl Into<String>, session: Arc<SessionState>) -> StreamProcessor {
        StreamProcessor::new(
            label,
            self.config.clone(),
            Arc::clone(&self.dispatcher),
            session,
            Arc::clone(&self.normalizer),
            Arc::clone(&self.stats),
        )
    }

    /// Open a processor and run it on its own task.
    pub fn spawn_stream(
        &self,
        label: impl Into<String>,
        session: Arc<SessionState>,
        chunks: mpsc::Receiver<StreamChunk>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), PipelineError>> {
        let mut processor = self.open_stream(label, session);
        tokio::spawn(async move { processor.run(chunks, cancel).await })
    }
}
