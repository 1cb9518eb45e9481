//! Response shapes and the mapping from domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Order, OrderId};
use crate::persistence::Page;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    #[schema(value_type = String, format = Uuid)]
    pub id: OrderId,
    pub name: String,
    pub count: i32,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            name: order.name.clone(),
            count: order.count,
            paid: order.paid,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagedData<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> PagedData<T> {
    pub fn map_from<S>(page: Page<S>, number: u32, size: u32) -> Self
    where
        for<'a> T: From<&'a S>,
    {
        Self {
            items: page.items.iter().map(T::from).collect(),
            page: number,
            page_size: size,
            total: page.total,
        }
    }
}

/// Body of `201 Created` for a new order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedOrder {
    #[schema(value_type = String, format = Uuid)]
    pub id: OrderId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_maps_without_version() {
        let (order, _) = Order::create("tea", 2).unwrap();
        let dto = OrderDto::from(&order);
        let json = serde_json::to_value(&dto).unwrap();

        assert_eq!(json["id"], order.id.to_string());
        assert_eq!(json["count"], 2);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_paged_data_maps_items() {
        let (a, _) = Order::create("a", 1).unwrap();
        let (b, _) = Order::create("b", 1).unwrap();
        let page = Page {
            items: vec![a, b],
            total: 7,
        };

        let paged: PagedData<OrderDto> = PagedData::map_from(page, 2, 2);
        assert_eq!(paged.items.len(), 2);
        assert_eq!(paged.items[0].name, "a");
        assert_eq!(paged.total, 7);
        assert_eq!(serde_json::to_value(&paged).unwrap()["pageSize"], 2);
    }
}
