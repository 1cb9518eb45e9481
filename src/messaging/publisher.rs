//! Integration event publisher.

use std::sync::Arc;

use uuid::Uuid;

use crate::messaging::bus::{EventBus, EventBusError};
use crate::messaging::message::{IntegrationEvent, IntegrationMessage};
use crate::messaging::monitor::MessageMonitor;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Publishes typed events with retries and records every outcome.
///
/// A message that exhausts its retries is kept in the monitor and re-sent by
/// [`retry_failed`](Self::retry_failed), which the host runs as a recurring
/// job.
#[derive(Clone)]
pub struct IntegrationEventPublisher {
    bus: Arc<dyn EventBus>,
    monitor: Arc<MessageMonitor>,
    retry: RetryPolicy,
    source: String,
}

impl IntegrationEventPublisher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        monitor: Arc<MessageMonitor>,
        retry: RetryPolicy,
        source: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            monitor,
            retry,
            source: source.into(),
        }
    }

    pub fn transport(&self) -> &'static str {
        self.bus.transport()
    }

    pub async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<Uuid, EventBusError> {
        let message = IntegrationMessage::from_event(event, &self.source)?;
        self.publish_message(&message).await?;
        Ok(message.id)
    }

    pub async fn publish_message(&self, message: &IntegrationMessage) -> Result<(), EventBusError> {
        let result = self
            .retry
            .run(|_| self.bus.publish(message))
            .await;

        match result {
            Ok(((), attempts)) => {
                tracing::debug!(id = %message.id, name = %message.name, attempts, "Published integration event");
                metrics::record_message("published", &message.name, "succeeded");
                self.monitor.record_published(message, attempts, None);
                Ok(())
            }
            Err((e, attempts)) => {
                tracing::error!(
                    id = %message.id,
                    name = %message.name,
                    attempts,
                    error = %e,
                    "Publishing integration event failed; kept for retry"
                );
                metrics::record_message("published", &message.name, "failed");
                self.monitor
                    .record_published(message, attempts, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Re-publish every failed message once. Returns how many went through.
    pub async fn retry_failed(&self) -> usize {
        let failed = self.monitor.failed_published();
        if failed.is_empty() {
            return 0;
        }

        let mut recovered = 0;
        for message in &failed {
            if self.publish_message(message).await.is_ok() {
                recovered += 1;
            }
        }
        tracing::info!(pending = failed.len(), recovered, "Retried failed integration events");
        recovered
    }
}
