//! Handler Set
//!
//! One type per `(kind, code)` pair of interest. Location handlers are the
//! only writers of session state; market handlers read it once and drop
//! their payload when the location is unknown.

mod location;
mod market;

pub use location::{ChangeClusterRequest, ClusterChangedEvent, JoinResponse};
pub use market::{AuctionGetOffersResponse, AuctionGetRequestsResponse, MarketSnapshotEvent};
