//! Sample `orders` module: commands, queries, mapping and controllers.
//!
//! # Data Flow
//! ```text
//! POST /api/orders ─▶ CreateOrderCommand ─▶ Mediator ─▶ handler
//!                                                        ├─▶ OrderRepository::add
//!                                                        └─▶ publish OrderCreatedIntegrationEvent
//! GET  /api/orders ─▶ ListOrdersQuery    ─▶ Mediator ─▶ OrderQueryService ─▶ OrderDto
//! ```
//!
//! # Design Decisions
//! - Controllers only translate HTTP into requests; all work goes through
//!   the mediator so validation and logging apply uniformly
//! - A publish failure does not fail the command: the message is kept by
//!   the monitor and re-sent by the `cap-failed-retry` job

pub mod controllers;
pub mod dto;
pub mod events;
pub mod orders;

use std::sync::Arc;

use crate::mediator::MediatorBuilder;
use crate::messaging::IntegrationEventPublisher;
use crate::persistence::{OrderQueryService, OrderRepository};

pub use controllers::ApiState;
pub use dto::{OrderDto, PagedData};
pub use events::{OrderCreatedIntegrationEvent, OrderCreatedIntegrationEventHandler, OrderPaidIntegrationEvent};
pub use orders::{CreateOrderCommand, GetOrderQuery, ListOrdersQuery, PayOrderCommand};

/// Register every orders handler with the mediator.
pub fn register_handlers(
    builder: MediatorBuilder,
    repository: Arc<dyn OrderRepository>,
    queries: Arc<dyn OrderQueryService>,
    publisher: IntegrationEventPublisher,
) -> MediatorBuilder {
    builder
        .register::<CreateOrderCommand, _>(orders::CreateOrderHandler::new(
            repository.clone(),
            publisher.clone(),
        ))
        .register::<PayOrderCommand, _>(orders::PayOrderHandler::new(repository, publisher))
        .register::<GetOrderQuery, _>(orders::GetOrderHandler::new(queries.clone()))
        .register::<ListOrdersQuery, _>(orders::ListOrdersHandler::new(queries))
}
