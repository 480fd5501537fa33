//! Market Normalizer
//!
//! Converts embedded order documents into [`MarketOrder`]s and hands
//! finished batches to the upload path. Location always comes from the
//! session snapshot; whatever the document claims is ignored.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::fanout::UploadFanout;
use crate::application::dispatch::SubDocument;
use crate::application::ports::{OrderStore, TaskExecutor};
use crate::domain::market::{
    AuctionType, CorrelationId, LocationId, MarketOrder, MarketUploadBatch,
};

// =============================================================================
// Document Conversion
// =============================================================================

/// Raw order document as sent by the server.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMarketOrder {
    id: u64,
    item_type_id: String,
    #[serde(default)]
    item_group_type_id: Option<String>,
    #[serde(default)]
    quality_level: u8,
    #[serde(default)]
    enchantment_level: u8,
    unit_price_silver: u64,
    amount: u32,
    auction_type: String,
    #[serde(default)]
    expires: String,
}

/// Why one document was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Document is not a valid order.
    #[error("Invalid order document: {message}")]
    InvalidDocument { message: String },

    /// Document element type cannot hold an order.
    #[error("Unsupported document type: {kind}")]
    UnsupportedDocument { kind: &'static str },

    /// Auction type is neither offer nor request.
    #[error("Unknown auction type: {value}")]
    UnknownAuctionType { value: String },
}

/// Orders that converted, plus how many documents did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    /// Converted orders in document order.
    pub orders: Vec<MarketOrder>,
    /// Documents skipped.
    pub rejected: usize,
}

fn parse_raw(document: &SubDocument) -> Result<RawMarketOrder, ConversionError> {
    let invalid = |e: serde_json::Error| ConversionError::InvalidDocument {
        message: e.to_string(),
    };
    match document {
        SubDocument::Text(text) => serde_json::from_str(text).map_err(invalid),
        SubDocument::Bytes(bytes) => serde_json::from_slice(bytes).map_err(invalid),
        SubDocument::Fields(fields) => {
            RawMarketOrder::deserialize(serde_json::Value::Object(fields.clone())).map_err(invalid)
        }
        SubDocument::Unsupported(kind) => Err(ConversionError::UnsupportedDocument { kind: *kind }),
    }
}

/// Convert one document, stamping the given location.
pub fn convert_document(
    document: &SubDocument,
    location: &LocationId,
) -> Result<MarketOrder, ConversionError> {
    let raw = parse_raw(document)?;
    let auction_type = AuctionType::from_str_case_insensitive(&raw.auction_type).ok_or_else(
        || ConversionError::UnknownAuctionType {
            value: raw.auction_type.clone(),
        },
    )?;

    Ok(MarketOrder {
        order_id: raw.id,
        item_id: raw.item_type_id,
        item_group_id: raw.item_group_type_id.filter(|g| !g.is_empty()),
        location_id: location.clone(),
        quality_level: raw.quality_level,
        enchantment_level: raw.enchantment_level,
        price: raw.unit_price_silver,
        amount: raw.amount,
        auction_type,
        expires: raw.expires,
    })
}

/// Convert every document, logging and skipping the ones that fail.
pub fn convert_documents(
    handler: &'static str,
    documents: &[SubDocument],
    location: &LocationId,
) -> Conversion {
    let mut conversion = Conversion {
        orders: Vec::with_capacity(documents.len()),
        rejected: 0,
    };

    for (index, document) in documents.iter().enumerate() {
        match convert_document(document, location) {
            Ok(order) => conversion.orders.push(order),
            Err(e) => {
                warn!(handler, index, error = %e, "Skipping market order document");
                conversion.rejected += 1;
            }
        }
    }

    conversion
}

// =============================================================================
// Batch Hand-off
// =============================================================================

/// Assembles batches and submits persistence and upload work.
pub struct MarketNormalizer {
    fanout: Arc<UploadFanout>,
    store: Option<Arc<dyn OrderStore>>,
    executor: Arc<dyn TaskExecutor>,
}

impl MarketNormalizer {
    /// Create a normalizer. `store` is `None` when persistence is disabled.
    #[must_use]
    pub fn new(
        fanout: Arc<UploadFanout>,
        store: Option<Arc<dyn OrderStore>>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            fanout,
            store,
            executor,
        }
    }

    /// Batch the orders under a fresh correlation id and submit them.
    ///
    /// Returns immediately; persistence and upload run on the executor.
    pub fn forward(&self, orders: Vec<MarketOrder>) -> CorrelationId {
        let correlation_id = CorrelationId::new_v4();

        if let Some(store) = &self.store {
            for order in &orders {
                let store = Arc::clone(store);
                let order = order.clone();
                self.executor.spawn(Box::pin(async move {
                    let order_id = order.order_id;
                    if let Err(e) = store.save(order).await {
                        debug!(order_id, error = %e, "Failed to persist market order");
                    }
                }));
            }
        }

        let batch = MarketUploadBatch::new(correlation_id, orders);
        info!(
            correlation_id = %correlation_id,
            orders = batch.len(),
            "Sending {} market orders to ingest (Identifier: {})",
            batch.len(),
            correlation_id
        );

        let fanout = Arc::clone(&self.fanout);
        self.executor.spawn(Box::pin(async move {
            fanout.publish(&batch).await;
        }));

        correlation_id
    }
}
