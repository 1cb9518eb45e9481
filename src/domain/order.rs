//! Sample `Order` aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strongly_typed_id;

strongly_typed_id!(
    /// Identifier of an [`Order`].
    OrderId
);

/// Maximum length of an order name.
pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("order name must be 1 to 100 characters")]
    InvalidName,

    #[error("order count must be at least 1")]
    InvalidCount,

    #[error("order {0} is already paid")]
    AlreadyPaid(OrderId),
}

/// Domain events raised by the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Created {
        id: OrderId,
        name: String,
        count: i32,
        created_at: DateTime<Utc>,
    },
    Paid {
        id: OrderId,
        paid_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub name: String,
    pub count: i32,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every persisted update.
    pub version: i32,
}

impl Order {
    /// Create a new unpaid order.
    pub fn create(name: &str, count: i32) -> Result<(Self, OrderEvent), OrderError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(OrderError::InvalidName);
        }
        if count < 1 {
            return Err(OrderError::InvalidCount);
        }

        let order = Self {
            id: OrderId::new(),
            name: name.to_string(),
            count,
            paid: false,
            created_at: Utc::now(),
            version: 0,
        };
        let event = OrderEvent::Created {
            id: order.id,
            name: order.name.clone(),
            count,
            created_at: order.created_at,
        };
        Ok((order, event))
    }

    pub fn mark_paid(&mut self) -> Result<OrderEvent, OrderError> {
        if self.paid {
            return Err(OrderError::AlreadyPaid(self.id));
        }
        self.paid = true;
        Ok(OrderEvent::Paid {
            id: self.id,
            paid_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trims_and_raises_event() {
        let (order, event) = Order::create("  coffee  ", 2).unwrap();
        assert_eq!(order.name, "coffee");
        assert!(!order.paid);
        assert_eq!(
            event,
            OrderEvent::Created {
                id: order.id,
                name: "coffee".into(),
                count: 2,
                created_at: order.created_at,
            }
        );
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        assert_eq!(Order::create("   ", 1).unwrap_err(), OrderError::InvalidName);
        assert_eq!(
            Order::create(&"x".repeat(MAX_NAME_LEN + 1), 1).unwrap_err(),
            OrderError::InvalidName
        );
        assert_eq!(Order::create("tea", 0).unwrap_err(), OrderError::InvalidCount);
    }

    #[test]
    fn test_pay_twice_fails() {
        let (mut order, _) = Order::create("tea", 1).unwrap();
        assert!(matches!(
            order.mark_paid().unwrap(),
            OrderEvent::Paid { id, .. } if id == order.id
        ));
        assert_eq!(order.mark_paid().unwrap_err(), OrderError::AlreadyPaid(order.id));
    }
}
