use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{constants::routing_keys::DEAD_LETTER_QUEUE_SUFFIX, helper::error_chain_fmt};

/// Publishes messages on the content exchange
///
/// This is the only capability the status service and the pipeline handlers need,
/// which keeps them testable with a recording publisher.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes a persistent message with the given routing key
    async fn publish(&self, routing_key: &str, data: &[u8]) -> Result<(), MessageBrokerError>;
}

/// Full broker channel owned by a worker: queue topology, consumption and direct re-publication
#[async_trait]
pub trait MessageBroker: MessagePublisher {
    /// Declares a durable queue bound to the exchange with `binding_key`,
    /// and the durable dead-letter queue associated to it.
    ///
    /// Idempotent.
    async fn declare_queue(&self, queue_name: &str, binding_key: &str)
        -> Result<(), MessageBrokerError>;

    /// Sends a persistent message straight to one queue, bypassing the exchange routing,
    /// carrying the number of retries already attempted.
    ///
    /// The consumer receives the message with `routing_key`, as if routed by the exchange.
    async fn publish_to_queue(
        &self,
        queue_name: &str,
        routing_key: &str,
        data: &[u8],
        retry_count: u32,
    ) -> Result<(), MessageBrokerError>;

    /// Starts consuming a queue with explicit acknowledgements.
    ///
    /// At most `prefetch_count` messages are delivered without being acknowledged.
    async fn consume(
        &self,
        queue_name: &str,
        prefetch_count: u16,
    ) -> Result<DeliveryStream, MessageBrokerError>;

    /// Closes the channel and the connection
    async fn disconnect(&self) -> Result<(), MessageBrokerError>;
}

pub type DeliveryStream = BoxStream<'static, Result<IncomingMessage, MessageBrokerError>>;

/// Acknowledgement handle of one delivery
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn ack(&self) -> Result<(), MessageBrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), MessageBrokerError>;
}

/// A message delivered to a consumer, with its own acknowledgement handle
pub struct IncomingMessage {
    pub routing_key: String,
    pub data: Vec<u8>,
    pub message_id: Option<String>,
    /// Retries already attempted by a worker, read from the retry count header
    pub retry_count: u32,
    /// Set by the broker when the message was delivered before and not acknowledged
    pub redelivered: bool,
    acker: Box<dyn MessageAcker>,
}

impl IncomingMessage {
    pub fn new(
        routing_key: String,
        data: Vec<u8>,
        message_id: Option<String>,
        retry_count: u32,
        redelivered: bool,
        acker: Box<dyn MessageAcker>,
    ) -> Self {
        Self {
            routing_key,
            data,
            message_id,
            retry_count,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), MessageBrokerError> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<(), MessageBrokerError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("routing_key", &self.routing_key)
            .field("message_id", &self.message_id)
            .field("retry_count", &self.retry_count)
            .field("redelivered", &self.redelivered)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Name of the queue receiving the messages given up on by the consumers of `queue_name`
pub fn dead_letter_queue_name(queue_name: &str) -> String {
    format!("{}.{}", queue_name, DEAD_LETTER_QUEUE_SUFFIX)
}

/// Topic exchange matching of a routing key against a binding key.
///
/// Both are dot separated words. In the binding key, `*` matches exactly one word
/// and `#` matches zero or more words.
pub fn binding_key_matches(binding_key: &str, routing_key: &str) -> bool {
    let binding: Vec<&str> = binding_key.split('.').collect();
    let routing: Vec<&str> = routing_key.split('.').collect();

    words_match(&binding, &routing)
}

fn words_match(binding: &[&str], routing: &[&str]) -> bool {
    match binding.split_first() {
        None => routing.is_empty(),
        Some((&"#", rest)) => (0..=routing.len()).any(|skip| words_match(rest, &routing[skip..])),
        Some((word, rest)) => match routing.split_first() {
            Some((first, routing_rest)) => {
                (*word == "*" || word == first) && words_match(rest, routing_rest)
            }
            None => false,
        },
    }
}

#[derive(thiserror::Error)]
pub enum MessageBrokerError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
    #[error("{0}")]
    ChannelInternalError(String),
    #[error("{0}")]
    NotInitialized(String),
}

impl std::fmt::Debug for MessageBrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
