//! Integration-event bus.
//!
//! # Data Flow
//! ```text
//! Publish:
//!     Command handler → IntegrationEventPublisher
//!         → envelope (IntegrationMessage) → EventBus::publish (with retries)
//!         → MessageMonitor (succeeded | failed, failed kept for requeue)
//!
//! Consume:
//!     EventBus::consume(group) → delivery → SubscriberRegistry::dispatch
//!         → handler(s) for the message name (each with retries)
//!         → MessageMonitor → ack | reject
//!
//! Recovery:
//!     recurring job `cap-failed-retry` → IntegrationEventPublisher::retry_failed
//! ```
//!
//! # Design Decisions
//! - Transport chosen at startup: RabbitMQ when enabled, in-memory otherwise
//! - At-least-once delivery: handlers must be idempotent
//! - A message a handler cannot process is rejected without requeue so one
//!   poison message cannot block its queue

pub mod bus;
pub mod dashboard;
pub mod memory;
pub mod message;
pub mod monitor;
pub mod publisher;
pub mod rabbitmq;
pub mod subscriber;

pub use bus::{run_consumer, topic_matches, DispatchError, EventBus, EventBusError, MessageDispatcher};
pub use dashboard::CapDashboard;
pub use memory::InMemoryEventBus;
pub use message::{IntegrationEvent, IntegrationMessage};
pub use monitor::{MessageMonitor, MessageStatus, MonitorStats};
pub use publisher::IntegrationEventPublisher;
pub use rabbitmq::RabbitMqEventBus;
pub use subscriber::{IntegrationEventHandler, SubscriberRegistry};

/// Id of the recurring job that re-publishes failed messages.
pub const FAILED_RETRY_JOB_ID: &str = "cap-failed-retry";
