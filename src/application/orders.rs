//! Commands, queries and their handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::application::dto::{OrderDto, PagedData};
use crate::application::events::{OrderCreatedIntegrationEvent, OrderPaidIntegrationEvent};
use crate::domain::{Order, OrderEvent, OrderId};
use crate::http::error::AppError;
use crate::mediator::{Request, RequestHandler};
use crate::messaging::{IntegrationEvent, IntegrationEventPublisher};
use crate::persistence::{OrderQueryService, OrderRepository};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderCommand {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "count must be at least 1"))]
    pub count: i32,
}

impl Request for CreateOrderCommand {
    type Response = OrderId;
}

#[derive(Debug, Clone, Validate)]
pub struct PayOrderCommand {
    pub id: OrderId,
}

impl Request for PayOrderCommand {
    type Response = ();
}

#[derive(Debug, Clone, Validate)]
pub struct GetOrderQuery {
    pub id: OrderId,
}

impl Request for GetOrderQuery {
    type Response = OrderDto;
}

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// 1-based page number.
    #[serde(default = "first_page")]
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "pageSize must be 1 to 100"))]
    pub page_size: u32,
}

impl Default for ListOrdersQuery {
    fn default() -> Self {
        Self {
            page: first_page(),
            page_size: default_page_size(),
        }
    }
}

fn first_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Request for ListOrdersQuery {
    type Response = PagedData<OrderDto>;
}

/// Publish the integration event for a domain event once the write
/// committed. The monitor keeps failed messages for the retry job, so the
/// command itself still succeeds.
async fn publish_after_commit(publisher: &IntegrationEventPublisher, event: OrderEvent) {
    let (topic, result) = match event {
        OrderEvent::Created {
            id,
            name,
            count,
            created_at,
        } => {
            let event = OrderCreatedIntegrationEvent {
                order_id: id,
                name,
                count,
                created_at,
            };
            (OrderCreatedIntegrationEvent::NAME, publisher.publish(&event).await)
        }
        OrderEvent::Paid { id, paid_at } => {
            let event = OrderPaidIntegrationEvent {
                order_id: id,
                paid_at,
            };
            (OrderPaidIntegrationEvent::NAME, publisher.publish(&event).await)
        }
    };
    if let Err(e) = result {
        tracing::warn!(event = topic, error = %e, "Integration event queued for retry");
    }
}

pub struct CreateOrderHandler {
    repository: Arc<dyn OrderRepository>,
    publisher: IntegrationEventPublisher,
}

impl CreateOrderHandler {
    pub fn new(repository: Arc<dyn OrderRepository>, publisher: IntegrationEventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }
}

#[async_trait]
impl RequestHandler<CreateOrderCommand> for CreateOrderHandler {
    async fn handle(&self, request: CreateOrderCommand) -> Result<OrderId, AppError> {
        let (order, created) = Order::create(&request.name, request.count)?;
        self.repository.add(&order).await?;
        tracing::info!(order_id = %order.id, "Order created");

        publish_after_commit(&self.publisher, created).await;
        Ok(order.id)
    }
}

pub struct PayOrderHandler {
    repository: Arc<dyn OrderRepository>,
    publisher: IntegrationEventPublisher,
}

impl PayOrderHandler {
    pub fn new(repository: Arc<dyn OrderRepository>, publisher: IntegrationEventPublisher) -> Self {
        Self {
            repository,
            publisher,
        }
    }
}

#[async_trait]
impl RequestHandler<PayOrderCommand> for PayOrderHandler {
    async fn handle(&self, request: PayOrderCommand) -> Result<(), AppError> {
        let mut order = self
            .repository
            .get(request.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", request.id)))?;

        let paid = order.mark_paid()?;
        self.repository.update(&mut order).await?;
        tracing::info!(order_id = %order.id, "Order paid");

        publish_after_commit(&self.publisher, paid).await;
        Ok(())
    }
}

pub struct GetOrderHandler {
    queries: Arc<dyn OrderQueryService>,
}

impl GetOrderHandler {
    pub fn new(queries: Arc<dyn OrderQueryService>) -> Self {
        Self { queries }
    }
}

#[async_trait]
impl RequestHandler<GetOrderQuery> for GetOrderHandler {
    async fn handle(&self, request: GetOrderQuery) -> Result<OrderDto, AppError> {
        self.queries
            .get_order(request.id)
            .await?
            .map(|order| OrderDto::from(&order))
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", request.id)))
    }
}

pub struct ListOrdersHandler {
    queries: Arc<dyn OrderQueryService>,
}

impl ListOrdersHandler {
    pub fn new(queries: Arc<dyn OrderQueryService>) -> Self {
        Self { queries }
    }
}

#[async_trait]
impl RequestHandler<ListOrdersQuery> for ListOrdersHandler {
    async fn handle(&self, request: ListOrdersQuery) -> Result<PagedData<OrderDto>, AppError> {
        let page = self
            .queries
            .list_orders(request.page, request.page_size)
            .await?;
        Ok(PagedData::map_from(page, request.page, request.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::register_handlers;
    use crate::mediator::Mediator;
    use crate::messaging::{EventBus, InMemoryEventBus, MessageMonitor, MessageStatus};
    use crate::persistence::InMemoryOrderStore;
    use crate::resilience::RetryPolicy;
    use axum::http::StatusCode;

    struct Fixture {
        mediator: Mediator,
        store: InMemoryOrderStore,
        monitor: Arc<MessageMonitor>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryOrderStore::new();
        let monitor = Arc::new(MessageMonitor::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let publisher =
            IntegrationEventPublisher::new(bus, monitor.clone(), RetryPolicy::new(1, 1, 1), "test");
        let mediator = register_handlers(
            Mediator::builder(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            publisher,
        )
        .build();
        Fixture {
            mediator,
            store,
            monitor,
        }
    }

    fn create(name: &str, count: i32) -> CreateOrderCommand {
        CreateOrderCommand {
            name: name.to_string(),
            count,
        }
    }

    #[tokio::test]
    async fn test_create_persists_and_publishes() {
        let f = fixture();
        let id = f.mediator.send(create("tea", 2)).await.unwrap();

        assert_eq!(f.store.len(), 1);
        let published = f.monitor.published(Some(MessageStatus::Succeeded));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].name, OrderCreatedIntegrationEvent::NAME);

        let dto = f.mediator.send(GetOrderQuery { id }).await.unwrap();
        assert_eq!(dto.name, "tea");
        assert!(!dto.paid);
    }

    #[tokio::test]
    async fn test_published_events_come_from_the_aggregate() {
        let f = fixture();
        let id = f.mediator.send(create("  tea  ", 3)).await.unwrap();
        f.mediator.send(PayOrderCommand { id }).await.unwrap();

        let stored = f.store.get(id).await.unwrap().unwrap();
        let published = f.monitor.published(Some(MessageStatus::Succeeded));
        assert_eq!(published.len(), 2);

        let created = published
            .iter()
            .find(|r| r.name == OrderCreatedIntegrationEvent::NAME)
            .unwrap()
            .message()
            .decode::<OrderCreatedIntegrationEvent>()
            .unwrap();
        assert_eq!(created.order_id, id);
        assert_eq!(created.name, "tea");
        assert_eq!(created.count, 3);
        assert_eq!(created.created_at, stored.created_at);

        let paid = published
            .iter()
            .find(|r| r.name == OrderPaidIntegrationEvent::NAME)
            .unwrap()
            .message()
            .decode::<OrderPaidIntegrationEvent>()
            .unwrap();
        assert_eq!(paid.order_id, id);
        assert!(paid.paid_at >= created.created_at);
    }

    #[tokio::test]
    async fn test_invalid_command_lists_fields() {
        let f = fixture();
        let err = f.mediator.send(create("", 0)).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("count"));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_pay_twice_conflicts() {
        let f = fixture();
        let id = f.mediator.send(create("tea", 1)).await.unwrap();

        f.mediator.send(PayOrderCommand { id }).await.unwrap();
        let err = f.mediator.send(PayOrderCommand { id }).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let dto = f.mediator.send(GetOrderQuery { id }).await.unwrap();
        assert!(dto.paid);
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let f = fixture();
        let err = f
            .mediator
            .send(PayOrderCommand { id: OrderId::new() })
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let f = fixture();
        for i in 0..3 {
            f.mediator.send(create(&format!("order {i}"), 1)).await.unwrap();
        }

        let page = f
            .mediator
            .send(ListOrdersQuery {
                page: 1,
                page_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);

        let err = f
            .mediator
            .send(ListOrdersQuery {
                page: 0,
                page_size: 500,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
