//! Market data handlers.
//!
//! Each one validates the session, converts its embedded documents, and
//! forwards the surviving orders. A payload seen while the location is
//! unknown is dropped with no side effects.

use tracing::debug;

use super::super::codes::key;
use super::super::{
    FromParameters, Handler, HandlerContext, HandlerOutcome, ParamReader, SubDocument,
};
use crate::application::services::convert_documents;

fn forward(handler: &'static str, documents: &[SubDocument], ctx: &HandlerContext<'_>) -> HandlerOutcome {
    let Some(location) = ctx.session.location() else {
        debug!(handler, documents = documents.len(), "Location unknown, dropping market data");
        return HandlerOutcome::InvalidSession;
    };

    let conversion = convert_documents(handler, documents, &location);
    let rejected = conversion.rejected;
    if conversion.orders.is_empty() {
        debug!(handler, rejected, "No valid orders in message");
        return HandlerOutcome::NoValidOrders { rejected };
    }

    let orders = conversion.orders.len();
    let correlation_id = ctx.normalizer.forward(conversion.orders);
    HandlerOutcome::Forwarded {
        correlation_id,
        orders,
        rejected,
    }
}

/// Sell listings returned by an auction house query.
#[derive(Debug, Clone, Default)]
pub struct AuctionGetOffersResponse {
    offers: Vec<SubDocument>,
}

impl FromParameters for AuctionGetOffersResponse {
    fn from_parameters(params: &ParamReader<'_>) -> Self {
        Self {
            offers: params.documents(key::ORDER_DOCUMENTS),
        }
    }
}

impl Handler for AuctionGetOffersResponse {
    fn name(&self) -> &'static str {
        "auction_get_offers"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        forward(self.name(), &self.offers, ctx)
    }
}

/// Buy listings returned by an auction house query.
#[derive(Debug, Clone, Default)]
pub struct AuctionGetRequestsResponse {
    requests: Vec<SubDocument>,
}

impl FromParameters for AuctionGetRequestsResponse {
    fn from_parameters(params: &ParamReader<'_>) -> Self {
        Self {
            requests: params.documents(key::ORDER_DOCUMENTS),
        }
    }
}

impl Handler for AuctionGetRequestsResponse {
    fn name(&self) -> &'static str {
        "auction_get_requests"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        forward(self.name(), &self.requests, ctx)
    }
}

/// Live market orders pushed by the server.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshotEvent {
    orders: Vec<SubDocument>,
}

impl FromParameters for MarketSnapshotEvent {
    fn from_parameters(params: &ParamReader<'_>) -> Self {
        Self {
            orders: params.documents(key::ORDER_DOCUMENTS),
        }
    }
}

impl Handler for MarketSnapshotEvent {
    fn name(&self) -> &'static str {
        "market_snapshot"
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> HandlerOutcome {
        forward(self.name(), &self.orders, ctx)
    }
}
