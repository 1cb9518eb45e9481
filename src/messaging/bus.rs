//! Event bus abstraction.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::lifecycle::{panic_message, Shutdown};
use crate::messaging::message::IntegrationMessage;
use crate::resilience::RetryPolicy;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("publish of '{name}' failed: {reason}")]
    Publish { name: String, reason: String },

    #[error("subscription of group '{group}' failed: {reason}")]
    Subscribe { group: String, reason: String },

    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of dispatching one delivery.
#[derive(Debug, Error)]
#[error("{handler} failed after {attempts} attempt(s): {reason}")]
pub struct DispatchError {
    pub handler: String,
    pub attempts: u32,
    pub reason: String,
}

/// Receives deliveries pulled off the bus by [`EventBus::consume`].
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Topics the dispatcher wants bound for its group.
    fn topics(&self) -> Vec<String>;

    async fn dispatch(&self, message: IntegrationMessage) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Transport name for logs and the dashboard.
    fn transport(&self) -> &'static str;

    async fn publish(&self, message: &IntegrationMessage) -> Result<(), EventBusError>;

    /// Pull deliveries for `group` until `shutdown` fires.
    ///
    /// A delivery is acknowledged after a successful dispatch and dropped
    /// (not requeued) when the dispatcher gives up.
    async fn consume(
        &self,
        group: &str,
        dispatcher: Arc<dyn MessageDispatcher>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventBusError>;
}

/// Keep `group` consuming until shutdown.
///
/// A consumer that returns an error, panics, or whose stream ends before
/// shutdown is resubscribed after a backoff delay.
pub async fn run_consumer(
    bus: Arc<dyn EventBus>,
    group: String,
    dispatcher: Arc<dyn MessageDispatcher>,
    shutdown: Arc<Shutdown>,
    retry: RetryPolicy,
) {
    let mut stop = shutdown.subscribe();
    let mut failures: u32 = 0;

    loop {
        let outcome = AssertUnwindSafe(bus.consume(&group, dispatcher.clone(), shutdown.subscribe()))
            .catch_unwind()
            .await;
        let reason = match outcome {
            Ok(Ok(())) => match stop.try_recv() {
                Err(TryRecvError::Empty) => "consumer stream ended".to_string(),
                _ => return,
            },
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("consumer panicked: {}", panic_message(panic.as_ref())),
        };

        failures = failures.saturating_add(1);
        let wait = retry.delay_for(failures);
        tracing::error!(
            group = %group,
            failures,
            retry_in_ms = wait.as_millis() as u64,
            reason = %reason,
            "Event consumer stopped, resubscribing"
        );
        tokio::select! {
            _ = stop.recv() => return,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

/// AMQP topic matching: `*` is exactly one word, `#` is zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                matches(&pattern[1..], key) || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}
