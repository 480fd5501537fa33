#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Relay - Passive Market Order Relay
//!
//! Decodes the game client's binary RPC byte stream, keeps track of which
//! marketplace the session is standing in, and forwards the market orders it
//! sees to one or more ingestion endpoints.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Record types and state with no I/O
//!   - `market`: Market orders, upload batches, identifiers
//!   - `protocol`: Decoded messages and parameter values
//!   - `session`: Location state machine
//!
//! - **Application**: Routing and use cases
//!   - `dispatch`: Handler registry, field mapping, handler set
//!   - `ports`: Interfaces for publishers, stores, executors, stream input
//!   - `services`: Stream processing, normalization, upload fan-out
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `protocol`: Command framing, fragment reassembly, parameter decoding
//!   - `source`: File or stdin byte streams
//!   - `ingest`: HTTP and in-memory publishers
//!   - `persistence`: JSON-lines and in-memory order stores
//!   - `executor`: Tokio task tracker and deferred executors
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! byte stream ──► FrameDecoder ──► Dispatcher ──► Handler ──┬──► SessionState
//!                                                          │
//!                                                          └──► MarketNormalizer
//!                                                                   │
//!                                           ┌───────────────────────┤
//!                                           ▼                       ▼
//!                                      OrderStore             UploadFanout ──► Destination 1
//!                                                                          ──► Destination N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market records, decoded messages, session state.
pub mod domain;

/// Application layer - Dispatch, services, and port definitions.
pub mod application;

/// Infrastructure layer - Decoder, adapters, and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{AuctionType, CorrelationId, LocationId, MarketOrder, MarketUploadBatch};
pub use domain::protocol::{MessageKind, Parameters, ProtocolMessage, Value};
pub use domain::session::{SessionPhase, SessionState};

// Dispatch
pub use application::dispatch::{
    DispatchOutcome, Dispatcher, Handler, HandlerContext, HandlerOutcome,
};

// Ports
pub use application::ports::{
    MarketPublisher, OrderStore, PublishError, StoreError, StreamChunk, TaskExecutor,
};

// Services
pub use application::services::{
    FanoutReport, MarketNormalizer, PipelineError, PipelineEvent, PipelineStats,
    PipelineStatsSnapshot, Relay, StreamProcessor, UploadFanout,
};

// Protocol decoder
pub use infrastructure::protocol::{
    DecoderConfig, DuplicateKeyPolicy, Frame, FrameDecoder, FrameError,
};
#[cfg(any(test, feature = "test-util"))]
pub use infrastructure::protocol::CommandWriter;

// Adapters
pub use infrastructure::executor::{DeferredExecutor, TokioExecutor};
pub use infrastructure::ingest::{HttpPublisher, InMemoryPublisher};
pub use infrastructure::persistence::{InMemoryOrderStore, JsonLinesOrderStore};
pub use infrastructure::source::{ByteStreamSource, InputSource, SourceError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
