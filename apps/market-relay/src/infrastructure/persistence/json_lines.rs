//! Append-only JSON-lines order store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::application::ports::{OrderStore, StoreError};
use crate::domain::market::MarketOrder;

#[derive(Serialize)]
struct StoredOrder<'a> {
    #[serde(rename = "CapturedAt")]
    captured_at: DateTime<Utc>,
    #[serde(flatten)]
    order: &'a MarketOrder,
}

/// Appends one JSON object per order to a file.
#[derive(Debug)]
pub struct JsonLinesOrderStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesOrderStore {
    /// Store writing to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OrderStore for JsonLinesOrderStore {
    async fn save(&self, order: MarketOrder) -> Result<(), StoreError> {
        let record = StoredOrder {
            captured_at: Utc::now(),
            order: &order,
        };
        let mut line = serde_json::to_vec(&record).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        line.push(b'\n');

        let io_error = |e: std::io::Error| StoreError::Io {
            message: e.to_string(),
        };

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(&line).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{AuctionType, LocationId};

    fn order(id: u64) -> MarketOrder {
        MarketOrder {
            order_id: id,
            item_id: "T4_BAG".into(),
            item_group_id: None,
            location_id: LocationId::new("3005").unwrap(),
            quality_level: 1,
            enchantment_level: 0,
            price: 500,
            amount: 4,
            auction_type: AuctionType::Offer,
            expires: String::new(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesOrderStore::new(dir.path().join("orders.jsonl"));

        store.save(order(1)).await.unwrap();
        store.save(order(2)).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["Id"], 1);
        assert_eq!(lines[1]["Id"], 2);
        assert!(lines[0]["CapturedAt"].is_string());
        assert_eq!(lines[0]["LocationId"], "3005");
    }

    #[tokio::test]
    async fn unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesOrderStore::new(dir.path().join("missing").join("orders.jsonl"));
        let err = store.save(order(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
