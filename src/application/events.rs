//! Integration events raised by the orders module and their local subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OrderId;
use crate::lifecycle::BoxError;
use crate::messaging::{IntegrationEvent, IntegrationEventHandler, IntegrationMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedIntegrationEvent {
    pub order_id: OrderId,
    pub name: String,
    pub count: i32,
    pub created_at: DateTime<Utc>,
}

impl IntegrationEvent for OrderCreatedIntegrationEvent {
    const NAME: &'static str = "orders.created";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaidIntegrationEvent {
    pub order_id: OrderId,
    pub paid_at: DateTime<Utc>,
}

impl IntegrationEvent for OrderPaidIntegrationEvent {
    const NAME: &'static str = "orders.paid";
}

/// Logs every created order and keeps a running count.
#[derive(Clone, Default)]
pub struct OrderCreatedIntegrationEventHandler {
    received: Arc<AtomicU64>,
}

impl OrderCreatedIntegrationEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IntegrationEventHandler<OrderCreatedIntegrationEvent> for OrderCreatedIntegrationEventHandler {
    async fn handle(
        &self,
        event: OrderCreatedIntegrationEvent,
        message: &IntegrationMessage,
    ) -> Result<(), BoxError> {
        let total = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            message_id = %message.id,
            order_id = %event.order_id,
            name = %event.name,
            count = event.count,
            total,
            "Order created"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_counts_events() {
        let handler = OrderCreatedIntegrationEventHandler::new();
        let event = OrderCreatedIntegrationEvent {
            order_id: OrderId::new(),
            name: "tea".into(),
            count: 1,
            created_at: Utc::now(),
        };
        let message = IntegrationMessage::from_event(&event, "test").unwrap();

        handler.handle(message.decode().unwrap(), &message).await.unwrap();
        handler.handle(event, &message).await.unwrap();
        assert_eq!(handler.received(), 2);
    }

    #[test]
    fn test_event_payload_uses_bare_id() {
        let id = OrderId::new();
        let event = OrderPaidIntegrationEvent {
            order_id: id,
            paid_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["orderId"], id.to_string());
    }
}
