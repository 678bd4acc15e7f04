use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::message_broker::{
    dead_letter_queue_name, DeliveryStream, IncomingMessage, MessageAcker, MessageBroker,
    MessageBrokerError, MessagePublisher,
};
use crate::constants::routing_keys::{ORIGINAL_ROUTING_KEY_HEADER, RETRY_COUNT_HEADER};

/// AMQP delivery mode of messages surviving a broker restart
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Message repository implemented with RabbitMQ
///
/// Publishes to and consumes from one durable topic exchange.
///
/// The enum definition gatekeeps functionalities if the repository is not ready (not initialized).
pub enum RabbitMQMessageRepository {
    Ready {
        /// RabbitMQ connection shared with other objects in different threads
        connection: Arc<Connection>,
        /// RabbitMQ channel should not be shared between threads, and is created for each thread
        /// (so one channel can be created for each thread)
        channel: Channel,
        exchange_name: String,
    },
    Idle {
        /// RabbitMQ connection shared with other objects in different threads
        connection: Arc<Connection>,
        exchange_name: String,
    },
}

/// Clones only the thread safe part of the repository
///
/// The channel is not cloned: the clone is idle and must be initialized
/// in the task using it.
impl Clone for RabbitMQMessageRepository {
    fn clone(&self) -> Self {
        match self {
            Self::Idle {
                connection,
                exchange_name,
            }
            | Self::Ready {
                connection,
                exchange_name,
                ..
            } => Self::Idle {
                connection: connection.clone(),
                exchange_name: exchange_name.clone(),
            },
        }
    }
}

impl RabbitMQMessageRepository {
    /// Builds an idle repository from an existing RabbitMQ connection
    ///
    /// No channel is created and no exchange is declared: `try_init` should be called after,
    /// inside the task using this repository.
    pub fn new(connection: Arc<Connection>, exchange_name: &str) -> Self {
        Self::Idle {
            connection,
            exchange_name: exchange_name.to_string(),
        }
    }

    /// Opens a dedicated connection to the broker and initializes the repository on it
    ///
    /// A connection failure is returned as is: restarting the process is left to the supervisor.
    #[tracing::instrument(name = "Connecting to RabbitMQ", skip(connection_properties))]
    pub async fn connect(
        uri: &str,
        connection_properties: ConnectionProperties,
        exchange_name: &str,
    ) -> Result<Self, MessageBrokerError> {
        let connection = Connection::connect(uri, connection_properties).await?;

        Self::new(Arc::new(connection), exchange_name)
            .try_init()
            .await
    }

    /// Initializes the repository
    ///
    /// Creates a RabbitMQ channel and declares the durable topic exchange
    /// to which this repository is associated. Initializing a ready repository does nothing.
    #[tracing::instrument(name = "🏗️ Initializing RabbitMQMessageRepository", skip(self))]
    pub async fn try_init(self) -> Result<Self, MessageBrokerError> {
        match self {
            Self::Ready { .. } => {
                info!("Already initialized");
                Ok(self)
            }

            Self::Idle {
                connection,
                exchange_name,
            } => {
                let channel = connection.create_channel().await?;

                let exchange_declare_options = ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                };

                // Idempotent
                channel
                    .exchange_declare(
                        exchange_name.as_str(),
                        ExchangeKind::Topic,
                        exchange_declare_options,
                        FieldTable::default(),
                    )
                    .await?;

                info!(
                    "Successfully declared exchange {} with properties: {:?}",
                    exchange_name, exchange_declare_options
                );

                Ok(Self::Ready {
                    connection,
                    channel,
                    exchange_name,
                })
            }
        }
    }

    pub fn exchange_name(&self) -> &str {
        match self {
            Self::Ready { exchange_name, .. } | Self::Idle { exchange_name, .. } => exchange_name,
        }
    }

    fn ready_channel(&self) -> Result<&Channel, MessageBrokerError> {
        match self {
            Self::Ready { channel, .. } => Ok(channel),
            Self::Idle { .. } => Err(MessageBrokerError::NotInitialized(
                "Cannot use the RabbitMQ channel, repository is not initialized".to_string(),
            )),
        }
    }
}

/// Properties shared by every published message
fn persistent_properties() -> BasicProperties {
    let current_time_ms = Utc::now().timestamp_millis() as u64;

    BasicProperties::default()
        .with_timestamp(current_time_ms)
        .with_message_id(Uuid::new_v4().to_string().into())
        .with_content_type("application/json".into())
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
}

#[async_trait]
impl MessagePublisher for RabbitMQMessageRepository {
    #[tracing::instrument(name = "Publishing message", skip(self, data))]
    async fn publish(&self, routing_key: &str, data: &[u8]) -> Result<(), MessageBrokerError> {
        let channel = self.ready_channel()?;

        // Not using publisher confirmation
        channel
            .basic_publish(
                self.exchange_name(),
                routing_key,
                BasicPublishOptions::default(),
                data,
                persistent_properties(),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RabbitMQMessageRepository {
    #[tracing::instrument(name = "Declaring and binding queue", skip(self))]
    async fn declare_queue(
        &self,
        queue_name: &str,
        binding_key: &str,
    ) -> Result<(), MessageBrokerError> {
        let channel = self.ready_channel()?;
        let queue_declare_options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };

        // Several replicas of a worker share the same named queue
        channel
            .queue_declare(queue_name, queue_declare_options, FieldTable::default())
            .await?;

        channel
            .queue_bind(
                queue_name,
                self.exchange_name(),
                binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        // Reached through the default exchange only, no binding needed
        let dead_letter_queue = dead_letter_queue_name(queue_name);
        channel
            .queue_declare(
                &dead_letter_queue,
                queue_declare_options,
                FieldTable::default(),
            )
            .await?;

        info!(
            "Declared queue {} (dead letters in {}) on exchange {}, binding on {}",
            queue_name,
            dead_letter_queue,
            self.exchange_name(),
            binding_key
        );

        Ok(())
    }

    #[tracing::instrument(name = "Publishing message to queue", skip(self, data))]
    async fn publish_to_queue(
        &self,
        queue_name: &str,
        routing_key: &str,
        data: &[u8],
        retry_count: u32,
    ) -> Result<(), MessageBrokerError> {
        let channel = self.ready_channel()?;

        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongUInt(retry_count),
        );
        headers.insert(
            ShortString::from(ORIGINAL_ROUTING_KEY_HEADER),
            AMQPValue::LongString(LongString::from(routing_key)),
        );

        // The default exchange routes a message to the queue named after its routing key
        channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                data,
                persistent_properties().with_headers(headers),
            )
            .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Consuming queue", skip(self))]
    async fn consume(
        &self,
        queue_name: &str,
        prefetch_count: u16,
    ) -> Result<DeliveryStream, MessageBrokerError> {
        let channel = self.ready_channel()?;

        // The broker stops delivering once `prefetch_count` messages are not acknowledged
        channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await?;

        let consumer_options = BasicConsumeOptions {
            no_ack: false,
            ..BasicConsumeOptions::default()
        };

        let consumer = channel
            .basic_consume(queue_name, "", consumer_options, FieldTable::default())
            .await?;

        let deliveries = consumer
            .map(|delivery| {
                delivery
                    .map(incoming_message_from_delivery)
                    .map_err(MessageBrokerError::from)
            })
            .boxed();

        Ok(deliveries)
    }

    #[tracing::instrument(name = "Disconnecting from RabbitMQ", skip(self))]
    async fn disconnect(&self) -> Result<(), MessageBrokerError> {
        match self {
            Self::Ready {
                connection,
                channel,
                ..
            } => {
                if channel.status().connected() {
                    channel.close(200, "Worker stopped").await?;
                }
                if connection.status().connected() {
                    connection.close(200, "Worker stopped").await?;
                }
            }
            Self::Idle { connection, .. } => {
                if connection.status().connected() {
                    connection.close(200, "Worker stopped").await?;
                }
            }
        }

        info!("Disconnected from RabbitMQ");
        Ok(())
    }
}

fn incoming_message_from_delivery(delivery: Delivery) -> IncomingMessage {
    let headers = delivery.properties.headers().as_ref();
    let retry_count = retry_count_from_headers(headers);
    // Sent straight to a queue, the delivery routing key is the queue name
    let routing_key = original_routing_key_from_headers(headers)
        .unwrap_or_else(|| delivery.routing_key.as_str().to_string());
    let message_id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| id.as_str().to_string());

    IncomingMessage::new(
        routing_key,
        delivery.data,
        message_id,
        retry_count,
        delivery.redelivered,
        Box::new(RabbitMQAcker(delivery.acker)),
    )
}

/// Reads the retry count header, any integer representation is accepted
fn retry_count_from_headers(headers: Option<&FieldTable>) -> u32 {
    let value = headers.and_then(|headers| {
        headers
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
            .map(|(_, value)| value)
    });

    match value {
        None => 0,
        Some(AMQPValue::ShortShortUInt(count)) => u32::from(*count),
        Some(AMQPValue::ShortUInt(count)) => u32::from(*count),
        Some(AMQPValue::LongUInt(count)) => *count,
        Some(AMQPValue::ShortShortInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::ShortInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::LongInt(count)) => u32::try_from(*count).unwrap_or(0),
        Some(AMQPValue::LongLongInt(count)) => u32::try_from(*count).unwrap_or(u32::MAX),
        Some(other) => {
            warn!(?other, "Unexpected retry count header type, ignoring it");
            0
        }
    }
}

fn original_routing_key_from_headers(headers: Option<&FieldTable>) -> Option<String> {
    let value = headers?
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == ORIGINAL_ROUTING_KEY_HEADER)
        .map(|(_, value)| value)?;

    match value {
        AMQPValue::LongString(routing_key) => {
            Some(String::from_utf8_lossy(routing_key.as_bytes()).into_owned())
        }
        AMQPValue::ShortString(routing_key) => Some(routing_key.as_str().to_string()),
        other => {
            warn!(?other, "Unexpected original routing key header type, ignoring it");
            None
        }
    }
}

struct RabbitMQAcker(Acker);

#[async_trait]
impl MessageAcker for RabbitMQAcker {
    async fn ack(&self) -> Result<(), MessageBrokerError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessageBrokerError> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}
