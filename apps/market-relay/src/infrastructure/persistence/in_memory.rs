//! In-memory order store for testing.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{OrderStore, StoreError};
use crate::domain::market::MarketOrder;

/// Keeps saved orders in memory.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<Vec<MarketOrder>>,
}

impl InMemoryOrderStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders saved so far, in save order.
    #[must_use]
    pub fn orders(&self) -> Vec<MarketOrder> {
        self.orders.read().clone()
    }

    /// Number of saved orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: MarketOrder) -> Result<(), StoreError> {
        self.orders.write().push(order);
        Ok(())
    }
}
