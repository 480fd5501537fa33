//! Operation and event codes for the current game build.
//!
//! Codes shift between game releases; only this table changes when they do.

/// Operation codes (requests and responses).
pub mod operation {
    /// Player joined a world; the response carries the location.
    pub const JOIN: u16 = 2;
    /// Client asked to move to another cluster.
    pub const CHANGE_CLUSTER: u16 = 41;
    /// Sell listings returned for an auction house query.
    pub const AUCTION_GET_OFFERS: u16 = 76;
    /// Buy listings returned for an auction house query.
    pub const AUCTION_GET_REQUESTS: u16 = 77;
}

/// Event codes.
pub mod event {
    /// Server confirmed the new cluster after a transition.
    pub const CLUSTER_CHANGED: u16 = 14;
    /// Server pushed a batch of live market orders.
    pub const MARKET_SNAPSHOT: u16 = 91;
}

/// Parameter keys used by the market handlers.
pub mod key {
    /// Location on the join response.
    pub const JOIN_LOCATION: u8 = 8;
    /// Location on the cluster changed event.
    pub const CLUSTER_LOCATION: u8 = 0;
    /// Embedded order documents.
    pub const ORDER_DOCUMENTS: u8 = 0;
}
