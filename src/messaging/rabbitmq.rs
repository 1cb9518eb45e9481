//! RabbitMQ transport.
//!
//! Topology:
//! ```text
//! publisher ──(routing key = message name)──▶ topic exchange
//!                                                 │ binding per topic
//!                                                 ▼
//!                                  durable queue named after the group
//!                                                 │ manual ack
//!                                                 ▼
//!                                           dispatcher
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::RabbitMqConfig;
use crate::messaging::bus::{EventBus, EventBusError, MessageDispatcher};
use crate::messaging::message::IntegrationMessage;

const PREFETCH: u16 = 16;
const PERSISTENT: u8 = 2;

pub struct RabbitMqEventBus {
    connection: Connection,
    publish_channel: Channel,
    exchange: String,
}

impl RabbitMqEventBus {
    /// Connect, open a confirming publish channel and declare the exchange.
    pub async fn connect(config: &RabbitMqConfig) -> Result<Self, EventBusError> {
        let connection = Connection::connect(&config.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        let publish_channel = connection
            .create_channel()
            .await
            .map_err(|e| EventBusError::Connection(e.to_string()))?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| EventBusError::Connection(e.to_string()))?;
        publish_channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| EventBusError::Connection(e.to_string()))?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            exchange = %config.exchange,
            "Connected to RabbitMQ"
        );

        Ok(Self {
            connection,
            publish_channel,
            exchange: config.exchange.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            tracing::debug!(error = %e, "RabbitMQ connection close failed");
        }
    }

    async fn declare_queue(&self, channel: &Channel, group: &str, topics: &[String]) -> Result<(), lapin::Error> {
        channel
            .queue_declare(
                group,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        for topic in topics {
            channel
                .queue_bind(
                    group,
                    &self.exchange,
                    topic,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        channel.basic_qos(PREFETCH, BasicQosOptions::default()).await?;
        Ok(())
    }
}

#[async_trait]
impl EventBus for RabbitMqEventBus {
    fn transport(&self) -> &'static str {
        "rabbitmq"
    }

    async fn publish(&self, message: &IntegrationMessage) -> Result<(), EventBusError> {
        let payload = serde_json::to_vec(message)?;
        let publish_error = |reason: String| EventBusError::Publish {
            name: message.name.clone(),
            reason,
        };

        let confirm = self
            .publish_channel
            .basic_publish(
                &self.exchange,
                &message.name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_message_id(message.id.to_string().into())
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        if confirm.is_nack() {
            return Err(publish_error("broker rejected the message".to_string()));
        }
        Ok(())
    }

    async fn consume(
        &self,
        group: &str,
        dispatcher: Arc<dyn MessageDispatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventBusError> {
        let topics = dispatcher.topics();
        let subscribe_error = |e: lapin::Error| EventBusError::Subscribe {
            group: group.to_string(),
            reason: e.to_string(),
        };

        let channel = self.connection.create_channel().await.map_err(subscribe_error)?;
        self.declare_queue(&channel, group, &topics)
            .await
            .map_err(subscribe_error)?;

        let tag = format!("{group}-{}", Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(group, &tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(subscribe_error)?;
        tracing::info!(group, ?topics, "RabbitMQ consumer started");

        loop {
            let delivery = tokio::select! {
                _ = shutdown.recv() => break,
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        tracing::error!(group, error = %e, "RabbitMQ consumer failed");
                        return Err(subscribe_error(e));
                    }
                    None => break,
                },
            };

            let outcome = match serde_json::from_slice::<IntegrationMessage>(&delivery.data) {
                Ok(mut message) => {
                    message.group = Some(group.to_string());
                    dispatcher.dispatch(message).await.map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("undecodable message: {e}")),
            };

            let settled = match outcome {
                Ok(()) => delivery.ack(BasicAckOptions::default()).await,
                Err(reason) => {
                    tracing::warn!(group, %reason, "Rejecting message");
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await
                }
            };
            if let Err(e) = settled {
                tracing::warn!(group, error = %e, "Failed to settle delivery");
            }
        }

        if let Err(e) = channel.close(200, "consumer stopped").await {
            tracing::debug!(group, error = %e, "Consumer channel close failed");
        }
        tracing::info!(group, "RabbitMQ consumer stopped");
        Ok(())
    }
}
