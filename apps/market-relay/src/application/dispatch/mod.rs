//! Operation Dispatcher
//!
//! Routes each decoded message to the handler registered for its
//! `(kind, code)` pair. Unregistered codes are the common case and are
//! dropped without noise. Registered messages are mapped to a typed handler
//! through [`FromParameters`] and processed synchronously, so ordering within
//! a stream is preserved; handlers push their I/O onto an executor.
//!
//! New codes are added by registering a new handler type. Existing handlers
//! are never touched.

pub mod codes;
pub mod fields;
pub mod handlers;

use std::collections::HashMap;

use crate::application::services::MarketNormalizer;
use crate::domain::market::{CorrelationId, LocationId};
use crate::domain::protocol::{MessageKind, ProtocolMessage};
use crate::domain::session::SessionState;

pub use fields::{FromParameters, ParamReader, SubDocument};

// =============================================================================
// Handler Contract
// =============================================================================

/// Everything a handler may touch while processing.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Session location state for this stream.
    pub session: &'a SessionState,
    /// Batch assembly and upload hand-off.
    pub normalizer: &'a MarketNormalizer,
}

/// What a handler did with its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Session moved to `Known`.
    LocationEstablished(LocationId),
    /// Establishing message lacked a usable location; session is `Unknown`.
    LocationUnconfirmed,
    /// Location may be changing; session is `Unknown`.
    LocationInvalidated,
    /// Orders were handed to the upload path.
    Forwarded {
        /// Batch correlation id.
        correlation_id: CorrelationId,
        /// Orders in the batch.
        orders: usize,
        /// Documents skipped during conversion.
        rejected: usize,
    },
    /// Every document failed conversion, or there were none.
    NoValidOrders {
        /// Documents skipped during conversion.
        rejected: usize,
    },
    /// Market data arrived while the location was unknown and was dropped.
    InvalidSession,
}

impl HandlerOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LocationEstablished(_) => "location_established",
            Self::LocationUnconfirmed => "location_unconfirmed",
            Self::LocationInvalidated => "location_invalidated",
            Self::Forwarded { .. } => "forwarded",
            Self::NoValidOrders { .. } => "no_valid_orders",
            Self::InvalidSession => "invalid_session",
        }
    }
}

/// A typed handler for one `(kind, code)` pair.
pub trait Handler: Send {
    /// Handler name for logs.
    fn name(&self) -> &'static str;

    /// Validate, extract, and forward. Must not block on I/O.
    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome;
}

// =============================================================================
// Registry
// =============================================================================

/// Builds a boxed handler from parameters.
pub type HandlerFactory = fn(&ParamReader<'_>) -> Box<dyn Handler>;

fn build<H>(params: &ParamReader<'_>) -> Box<dyn Handler>
where
    H: Handler + FromParameters + 'static,
{
    Box::new(H::from_parameters(params))
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler for this `(kind, code)`.
    Unregistered,
    /// The registered handler ran.
    Handled {
        /// Handler name.
        handler: &'static str,
        /// What it did.
        outcome: HandlerOutcome,
    },
}

/// Registry from `(kind, code)` to handler factory.
#[derive(Default, Clone)]
pub struct Dispatcher {
    registry: HashMap<(MessageKind, u16), HandlerFactory>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.registry.keys().collect();
        keys.sort();
        f.debug_struct("Dispatcher").field("registered", &keys).finish()
    }
}

impl Dispatcher {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the market handler set.
    #[must_use]
    pub fn with_market_handlers() -> Self {
        use codes::{event, operation};
        use handlers::{
            AuctionGetOffersResponse, AuctionGetRequestsResponse, ChangeClusterRequest,
            ClusterChangedEvent, JoinResponse, MarketSnapshotEvent,
        };

        let mut dispatcher = Self::new();
        dispatcher.register::<JoinResponse>(MessageKind::Response, operation::JOIN);
        dispatcher.register::<ChangeClusterRequest>(MessageKind::Request, operation::CHANGE_CLUSTER);
        dispatcher.register::<ClusterChangedEvent>(MessageKind::Event, event::CLUSTER_CHANGED);
        dispatcher.register::<AuctionGetOffersResponse>(
            MessageKind::Response,
            operation::AUCTION_GET_OFFERS,
        );
        dispatcher.register::<AuctionGetRequestsResponse>(
            MessageKind::Response,
            operation::AUCTION_GET_REQUESTS,
        );
        dispatcher.register::<MarketSnapshotEvent>(MessageKind::Event, event::MARKET_SNAPSHOT);
        dispatcher
    }

    /// Register handler `H` for `(kind, code)`. Returns `true` if it replaced
    /// an earlier registration.
    pub fn register<H>(&mut self, kind: MessageKind, code: u16) -> bool
    where
        H: Handler + FromParameters + 'static,
    {
        self.registry.insert((kind, code), build::<H>).is_some()
    }

    /// Whether a handler exists for `(kind, code)`.
    #[must_use]
    pub fn is_registered(&self, kind: MessageKind, code: u16) -> bool {
        self.registry.contains_key(&(kind, code))
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Route one message.
    pub fn dispatch(&self, message: &ProtocolMessage, ctx: &HandlerContext<'_>) -> DispatchOutcome {
        let Some(factory) = self.registry.get(&(message.kind, message.code)) else {
            tracing::trace!(
                kind = message.kind.as_str(),
                code = message.code,
                "No handler registered"
            );
            return DispatchOutcome::Unregistered;
        };

        let handler = factory(&ParamReader::new(&message.parameters));
        let outcome = handler.process(ctx);
        tracing::debug!(
            handler = handler.name(),
            outcome = outcome.as_str(),
            "Message handled"
        );
        DispatchOutcome::Handled {
            handler: handler.name(),
            outcome,
        }
    }
}
