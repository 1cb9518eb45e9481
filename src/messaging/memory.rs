//! In-process event bus.
//!
//! Used when the broker is disabled and in tests. Every consumer sees every
//! message whose name matches one of its topics; there is no redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::messaging::bus::{topic_matches, EventBus, EventBusError, MessageDispatcher};
use crate::messaging::message::IntegrationMessage;

const CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct InMemoryEventBus {
    tx: broadcast::Sender<IntegrationMessage>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    fn transport(&self) -> &'static str {
        "in-memory"
    }

    async fn publish(&self, message: &IntegrationMessage) -> Result<(), EventBusError> {
        // No subscribers is not an error: the message is simply not consumed.
        let _ = self.tx.send(message.clone());
        Ok(())
    }

    async fn consume(
        &self,
        group: &str,
        dispatcher: Arc<dyn MessageDispatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventBusError> {
        let topics = dispatcher.topics();
        let mut rx = self.tx.subscribe();
        tracing::info!(group, ?topics, "In-memory consumer started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = rx.recv() => match received {
                    Ok(mut message) => {
                        if !topics.iter().any(|t| topic_matches(t, &message.name)) {
                            continue;
                        }
                        message.group = Some(group.to_string());
                        if let Err(e) = dispatcher.dispatch(message).await {
                            tracing::warn!(group, error = %e, "Dropping message after failed dispatch");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(group, skipped, "In-memory consumer lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        tracing::info!(group, "In-memory consumer stopped");
        Ok(())
    }
}
