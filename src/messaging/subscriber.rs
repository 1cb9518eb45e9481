//! Typed subscribers and the registry that dispatches deliveries to them.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::lifecycle::{panic_message, BoxError};
use crate::mediator::short_type_name;
use crate::messaging::bus::{DispatchError, MessageDispatcher};
use crate::messaging::message::{IntegrationEvent, IntegrationMessage};
use crate::messaging::monitor::MessageMonitor;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Handles one integration event type.
///
/// Delivery is at-least-once: implementations must tolerate duplicates.
#[async_trait]
pub trait IntegrationEventHandler<E: IntegrationEvent>: Send + Sync + 'static {
    async fn handle(&self, event: E, message: &IntegrationMessage) -> Result<(), BoxError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, message: &IntegrationMessage) -> Result<(), BoxError>;
}

struct Subscription<E, H> {
    name: String,
    handler: H,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedHandler for Subscription<E, H>
where
    E: IntegrationEvent + 'static,
    H: IntegrationEventHandler<E>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &IntegrationMessage) -> Result<(), BoxError> {
        let event = message.decode::<E>()?;
        self.handler.handle(event, message).await
    }
}

/// Topic → handlers, built once at startup.
pub struct SubscriberRegistry {
    handlers: BTreeMap<String, Vec<Arc<dyn ErasedHandler>>>,
    monitor: Arc<MessageMonitor>,
    retry: RetryPolicy,
}

impl SubscriberRegistry {
    pub fn new(monitor: Arc<MessageMonitor>, retry: RetryPolicy) -> Self {
        Self {
            handlers: BTreeMap::new(),
            monitor,
            retry,
        }
    }

    pub fn subscribe<E, H>(mut self, handler: H) -> Self
    where
        E: IntegrationEvent + 'static,
        H: IntegrationEventHandler<E>,
    {
        let name = short_type_name::<H>().to_string();
        tracing::debug!(topic = E::NAME, handler = %name, "Registered integration event handler");
        self.handlers
            .entry(E::NAME.to_string())
            .or_default()
            .push(Arc::new(Subscription {
                name,
                handler,
                _event: PhantomData,
            }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// `(topic, handler names)` for the dashboard.
    pub fn subscriptions(&self) -> Vec<(String, Vec<String>)> {
        self.handlers
            .iter()
            .map(|(topic, hs)| (topic.clone(), hs.iter().map(|h| h.name().to_string()).collect()))
            .collect()
    }
}

#[async_trait]
impl MessageDispatcher for SubscriberRegistry {
    fn topics(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    async fn dispatch(&self, message: IntegrationMessage) -> Result<(), DispatchError> {
        let Some(handlers) = self.handlers.get(&message.name) else {
            tracing::debug!(name = %message.name, "No handler for message");
            return Ok(());
        };

        let mut attempts_made = 1;
        let mut failure: Option<DispatchError> = None;

        for handler in handlers {
            let result = self
                .retry
                .run(|attempt| {
                    let handler = handler.clone();
                    let message = &message;
                    async move {
                        tracing::debug!(handler = handler.name(), attempt, id = %message.id, "Dispatching message");
                        // A panicking handler counts as a failed attempt.
                        match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
                            Ok(result) => result,
                            Err(panic) => Err(BoxError::from(format!(
                                "handler panicked: {}",
                                panic_message(panic.as_ref())
                            ))),
                        }
                    }
                })
                .await;

            match result {
                Ok(((), attempts)) => attempts_made = attempts_made.max(attempts),
                Err((e, attempts)) => {
                    attempts_made = attempts_made.max(attempts);
                    tracing::error!(
                        handler = handler.name(),
                        id = %message.id,
                        name = %message.name,
                        attempts,
                        error = %e,
                        "Integration event handler failed"
                    );
                    failure.get_or_insert(DispatchError {
                        handler: handler.name().to_string(),
                        attempts,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let outcome = if failure.is_some() { "failed" } else { "succeeded" };
        metrics::record_message("received", &message.name, outcome);
        self.monitor.record_received(
            &message,
            attempts_made,
            failure.as_ref().map(ToString::to_string),
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
