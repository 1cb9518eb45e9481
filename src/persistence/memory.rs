//! In-memory order store, used by tests and database-less hosts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{Order, OrderId};
use crate::persistence::{offset, OrderQueryService, OrderRepository, Page, PersistenceError};

/// Serves both the write and read side from a single map.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn add(&self, order: &Order) -> Result<(), PersistenceError> {
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn update(&self, order: &mut Order) -> Result<(), PersistenceError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| PersistenceError::NotFound {
                entity: "order",
                id: order.id.to_string(),
            })?;

        if stored.version != order.version {
            return Err(PersistenceError::Concurrency {
                entity: "order",
                id: order.id.to_string(),
            });
        }

        order.version += 1;
        *stored = order.clone();
        Ok(())
    }
}

#[async_trait]
impl OrderQueryService for InMemoryOrderStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        OrderRepository::get(self, id).await
    }

    async fn list_orders(&self, page: u32, page_size: u32) -> Result<Page<Order>, PersistenceError> {
        let mut all: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = all.len() as u64;
        let skip = usize::try_from(offset(page, page_size)).unwrap_or(usize::MAX);
        let items = all.into_iter().skip(skip).take(page_size as usize).collect();
        Ok(Page { items, total })
    }
}
