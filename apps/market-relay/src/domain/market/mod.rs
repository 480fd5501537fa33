//! Market Order Types
//!
//! Canonical marketplace records produced by the normalizer and consumed by
//! the upload fan-out and the local order store. Field names on the wire use
//! the ingest service's `PascalCase` convention.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// World location the client is currently in.
///
/// A location id is never empty; use [`LocationId::new`] to build one from
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// Build a location id, returning `None` for empty or blank input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == id.len() {
            Some(Self(id))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier attached to one upload so every destination and every log line
/// for that upload can be tied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random correlation id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying uuid.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Which side of the auction house an order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionType {
    /// Sell order.
    Offer,
    /// Buy order.
    Request,
}

impl AuctionType {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Request => "request",
        }
    }

    /// Parse a wire value, ignoring ASCII case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("offer") {
            Some(Self::Offer)
        } else if s.eq_ignore_ascii_case("request") {
            Some(Self::Request)
        } else {
            None
        }
    }
}

impl fmt::Display for AuctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized marketplace order.
///
/// `location_id` is always taken from the session at the moment the message
/// was handled, never from the raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketOrder {
    /// Server-side order id.
    #[serde(rename = "Id")]
    pub order_id: u64,
    /// Item type identifier, e.g. `T4_BAG`.
    #[serde(rename = "ItemTypeId")]
    pub item_id: String,
    /// Item group identifier, when the server reports one.
    #[serde(rename = "ItemGroupTypeId", skip_serializing_if = "Option::is_none")]
    pub item_group_id: Option<String>,
    /// Location the order was observed in.
    #[serde(rename = "LocationId")]
    pub location_id: LocationId,
    /// Item quality tier.
    #[serde(rename = "QualityLevel")]
    pub quality_level: u8,
    /// Item enchantment level.
    #[serde(rename = "EnchantmentLevel")]
    pub enchantment_level: u8,
    /// Unit price in silver.
    #[serde(rename = "UnitPriceSilver")]
    pub price: u64,
    /// Quantity on the order.
    #[serde(rename = "Amount")]
    pub amount: u32,
    /// Offer or request.
    #[serde(rename = "AuctionType")]
    pub auction_type: AuctionType,
    /// Expiry timestamp exactly as reported by the server.
    #[serde(rename = "Expires")]
    pub expires: String,
}

// =============================================================================
// Upload Batch
// =============================================================================

/// A set of orders from one handled message, tagged with a correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketUploadBatch {
    correlation_id: CorrelationId,
    orders: Vec<MarketOrder>,
}

/// JSON body sent to ingest destinations.
#[derive(Debug, Serialize)]
pub struct UploadPayload<'a> {
    /// Orders in the batch.
    #[serde(rename = "Orders")]
    pub orders: &'a [MarketOrder],
}

impl MarketUploadBatch {
    /// Create a batch with the given correlation id.
    #[must_use]
    pub const fn new(correlation_id: CorrelationId, orders: Vec<MarketOrder>) -> Self {
        Self {
            correlation_id,
            orders,
        }
    }

    /// Correlation id shared by every destination receiving this batch.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Orders in the batch.
    #[must_use]
    pub fn orders(&self) -> &[MarketOrder] {
        &self.orders
    }

    /// Number of orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether the batch carries no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Serializable body for ingest destinations.
    #[must_use]
    pub fn payload(&self) -> UploadPayload<'_> {
        UploadPayload {
            orders: &self.orders,
        }
    }
}
