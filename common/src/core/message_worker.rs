use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::message_broker::{
    dead_letter_queue_name, IncomingMessage, MessageBroker, MessageBrokerError,
};
use crate::helper::error_chain_fmt;

/// Processes the payload of one consumed message
///
/// Implementations only decide the outcome: the worker acknowledges the message
/// on success and applies its retry policy on failure. Side effects must be
/// idempotent, a message can be delivered more than once.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process_event(&self, routing_key: &str, data: &[u8]) -> Result<(), ProcessingError>;
}

#[derive(thiserror::Error)]
pub enum ProcessingError {
    /// Transient failure, the message should be processed again
    #[error("Retryable processing error: {0}")]
    Retryable(anyhow::Error),
    /// The message can never be processed (undecodable payload for ex)
    #[error("Message rejected: {0}")]
    Rejected(anyhow::Error),
}

impl ProcessingError {
    pub fn retryable(error: impl Into<anyhow::Error>) -> Self {
        Self::Retryable(error.into())
    }

    pub fn rejected(error: impl Into<anyhow::Error>) -> Self {
        Self::Rejected(error.into())
    }
}

impl From<anyhow::Error> for ProcessingError {
    fn from(error: anyhow::Error) -> Self {
        Self::Retryable(error)
    }
}

impl std::fmt::Debug for ProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable(error) | Self::Rejected(error) => {
                writeln!(f, "{}", self)?;
                write!(f, "{:?}", error)
            }
        }
    }
}

/// What happens to a message whose processing failed with a retryable error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None`: the message is requeued until it succeeds.
    /// `Some(n)`: the message is retried `n` times, then moved to the dead-letter queue.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn requeue_forever() -> Self {
        Self { max_retries: None }
    }

    pub fn dead_letter_after(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub name: String,
    pub queue_name: String,
    pub binding_key: String,
    /// Maximum number of delivered messages not acknowledged yet
    pub prefetch_count: u16,
    pub retry_policy: RetryPolicy,
}

/// Outcome of a processed message, as applied on the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Acked,
    Requeued,
    Retried { retry_count: u32 },
    DeadLettered,
}

/// Consumes one queue and drives a processor, one message at a time
///
/// Owns its broker channel: the channel and its connection are closed when the worker stops.
pub struct MessageWorker {
    settings: WorkerSettings,
    broker: Arc<dyn MessageBroker>,
    processor: Arc<dyn MessageProcessor>,
    shutdown_token: CancellationToken,
}

impl MessageWorker {
    pub fn new(
        settings: WorkerSettings,
        broker: Arc<dyn MessageBroker>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Self {
        Self {
            settings,
            broker,
            processor,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Stops this worker together with every worker sharing the same token
    pub fn with_shutdown_token(mut self, shutdown_token: CancellationToken) -> Self {
        self.shutdown_token = shutdown_token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Requests a graceful shutdown. Calling it more than once does nothing more.
    pub fn stop(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!(worker = %self.settings.name, "Stopping worker");
            self.shutdown_token.cancel();
        }
    }

    /// Consumes messages until stopped, until the delivery stream ends or fails
    ///
    /// SIGINT and SIGTERM stop the worker. The message being processed when the
    /// shutdown is requested is processed to completion, then the channel is closed.
    #[tracing::instrument(
        name = "Running message worker",
        skip(self),
        fields(worker = %self.settings.name, queue = %self.settings.queue_name)
    )]
    pub async fn start(&self) -> Result<(), MessageWorkerError> {
        let signal_listener = tokio::spawn(shutdown_signal(self.shutdown_token.clone()));

        let result = self.consume_until_stopped().await;

        signal_listener.abort();
        if let Err(error) = self.broker.disconnect().await {
            warn!(?error, "Failed to disconnect worker from the broker");
        }

        info!("Worker stopped");
        result
    }

    async fn consume_until_stopped(&self) -> Result<(), MessageWorkerError> {
        let WorkerSettings {
            queue_name,
            binding_key,
            prefetch_count,
            ..
        } = &self.settings;

        self.broker.declare_queue(queue_name, binding_key).await?;
        let mut deliveries = self.broker.consume(queue_name, *prefetch_count).await?;

        info!(
            "📡 Worker consuming from queue {}, bound with {}, prefetch {}, waiting for messages ...",
            queue_name, binding_key, prefetch_count
        );

        loop {
            let delivery = tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => break,
                delivery = deliveries.next() => delivery,
            };

            let message = match delivery {
                Some(Ok(message)) => message,
                Some(Err(error)) => {
                    // A failed consumer does not recover, restarting is left to the supervisor
                    error!(?error, "Failed to consume message on queue {}, stopping", queue_name);
                    return Err(error.into());
                }
                None => {
                    info!("Delivery stream of queue {} ended", queue_name);
                    break;
                }
            };

            let span = info_span!(
                "Handling consumed message",
                routing_key = %message.routing_key,
                queue = %queue_name,
                message_id = ?message.message_id,
                retry_count = message.retry_count,
            );

            // Not raced with the shutdown: an in-flight message is always finished
            self.handle_message(message).instrument(span).await;
        }

        Ok(())
    }

    async fn handle_message(&self, message: IncomingMessage) -> Option<MessageOutcome> {
        let result = self
            .processor
            .process_event(&message.routing_key, &message.data)
            .await;

        match self.settle(&message, result).await {
            Ok(outcome) => {
                info!(?outcome, "Message settled");
                Some(outcome)
            }
            Err(error) => {
                error!(?error, "Failed to settle message");
                None
            }
        }
    }

    async fn settle(
        &self,
        message: &IncomingMessage,
        result: Result<(), ProcessingError>,
    ) -> Result<MessageOutcome, MessageBrokerError> {
        let error = match result {
            Ok(()) => {
                message.ack().await?;
                return Ok(MessageOutcome::Acked);
            }
            Err(error) => error,
        };

        match error {
            ProcessingError::Rejected(error) => {
                warn!(?error, "Message rejected, moving it to the dead-letter queue");
                self.dead_letter(message).await
            }
            ProcessingError::Retryable(error) => {
                error!(?error, "Failed to process message");

                match self.settings.retry_policy.max_retries {
                    None => {
                        message.nack(true).await?;
                        Ok(MessageOutcome::Requeued)
                    }
                    Some(max_retries) if message.retry_count < max_retries => {
                        let retry_count = message.retry_count + 1;
                        self.republish(message, &self.settings.queue_name, retry_count)
                            .await
                            .map(|_| MessageOutcome::Retried { retry_count })
                    }
                    Some(max_retries) => {
                        warn!(
                            "Message failed {} times, moving it to the dead-letter queue",
                            max_retries + 1
                        );
                        self.dead_letter(message).await
                    }
                }
            }
        }
    }

    async fn dead_letter(&self, message: &IncomingMessage) -> Result<MessageOutcome, MessageBrokerError> {
        let dead_letter_queue = dead_letter_queue_name(&self.settings.queue_name);
        self.republish(message, &dead_letter_queue, message.retry_count)
            .await
            .map(|_| MessageOutcome::DeadLettered)
    }

    /// Copies the message to `queue_name` then acknowledges the original.
    /// Falls back to requeueing the original if the copy could not be published.
    async fn republish(
        &self,
        message: &IncomingMessage,
        queue_name: &str,
        retry_count: u32,
    ) -> Result<(), MessageBrokerError> {
        match self
            .broker
            .publish_to_queue(queue_name, &message.routing_key, &message.data, retry_count)
            .await
        {
            Ok(()) => message.ack().await,
            Err(error) => {
                error!(?error, "Failed to publish message to queue {}, requeueing it", queue_name);
                message.nack(true).await?;
                Err(error)
            }
        }
    }
}

/// Cancels `shutdown_token` on SIGINT or SIGTERM
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(?error, "Failed to listen to SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(?error, "Failed to listen to SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
        _ = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}

#[derive(thiserror::Error)]
pub enum MessageWorkerError {
    #[error(transparent)]
    MessageBrokerError(#[from] MessageBrokerError),
}

impl std::fmt::Debug for MessageWorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
