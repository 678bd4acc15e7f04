//! In-process implementation of the broker contract.
//!
//! Messages live in memory, queues are bound with topic binding keys and the
//! prefetch limit is enforced per queue, the same way RabbitMQ does for a consumer.
//! It backs the integration tests and single process local runs; several handles
//! created with [`InMemoryMessageBroker::connection`] share the same queues.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::message_broker::{
    binding_key_matches, dead_letter_queue_name, DeliveryStream, IncomingMessage, MessageAcker,
    MessageBroker, MessageBrokerError, MessagePublisher,
};

/// A message published on the exchange, as seen by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    routing_key: String,
    data: Vec<u8>,
    message_id: String,
    retry_count: u32,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    binding_keys: Vec<String>,
    ready: VecDeque<QueuedMessage>,
    /// Delivered and not yet acknowledged
    outstanding: usize,
    max_outstanding: usize,
    acked: usize,
    requeued: usize,
    dropped: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    published: Vec<PublishedMessage>,
}

impl BrokerState {
    fn enqueue(&mut self, queue_name: &str, message: QueuedMessage) {
        self.queues
            .entry(queue_name.to_string())
            .or_default()
            .ready
            .push_back(message);
    }
}

#[derive(Clone)]
pub struct InMemoryMessageBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    /// Closed by `disconnect`, only for this handle and its clones
    closed: Arc<AtomicBool>,
}

impl Default for InMemoryMessageBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A new handle on the same queues, with its own connection lifecycle
    pub fn connection(&self) -> Self {
        Self {
            state: self.state.clone(),
            notify: self.notify.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every message published on the exchange, in publication order
    pub async fn published_messages(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.published.clone()
    }

    /// Payloads published on the exchange with exactly this routing key
    pub async fn published_with_routing_key(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|message| message.routing_key == routing_key)
            .map(|message| message.data.clone())
            .collect()
    }

    /// Payloads waiting in a queue, not delivered yet
    pub async fn queued_messages(&self, queue_name: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .queues
            .get(queue_name)
            .map(|queue| queue.ready.iter().map(|message| message.data.clone()).collect())
            .unwrap_or_default()
    }

    /// Highest number of unacknowledged deliveries observed at once on a queue
    pub async fn max_outstanding(&self, queue_name: &str) -> usize {
        self.queue_stat(queue_name, |queue| queue.max_outstanding).await
    }

    pub async fn outstanding(&self, queue_name: &str) -> usize {
        self.queue_stat(queue_name, |queue| queue.outstanding).await
    }

    pub async fn acked_count(&self, queue_name: &str) -> usize {
        self.queue_stat(queue_name, |queue| queue.acked).await
    }

    /// Messages negatively acknowledged with requeue
    pub async fn requeued_count(&self, queue_name: &str) -> usize {
        self.queue_stat(queue_name, |queue| queue.requeued).await
    }

    /// Messages negatively acknowledged without requeue
    pub async fn dropped_count(&self, queue_name: &str) -> usize {
        self.queue_stat(queue_name, |queue| queue.dropped).await
    }

    pub async fn is_queue_declared(&self, queue_name: &str) -> bool {
        self.state.lock().await.queues.contains_key(queue_name)
    }

    async fn queue_stat(&self, queue_name: &str, stat: impl Fn(&QueueState) -> usize) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue_name)
            .map(stat)
            .unwrap_or(0)
    }

    fn ensure_connected(&self) -> Result<(), MessageBrokerError> {
        if self.is_disconnected() {
            return Err(MessageBrokerError::ChannelInternalError(
                "In memory broker connection is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryMessageBroker {
    async fn publish(&self, routing_key: &str, data: &[u8]) -> Result<(), MessageBrokerError> {
        self.ensure_connected()?;

        let mut state = self.state.lock().await;
        state.published.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            data: data.to_vec(),
        });

        // Like a topic exchange: one copy per matching queue, dropped if none matches
        let matching_queues: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, queue)| {
                queue
                    .binding_keys
                    .iter()
                    .any(|binding_key| binding_key_matches(binding_key, routing_key))
            })
            .map(|(name, _)| name.clone())
            .collect();

        for queue_name in matching_queues {
            state.enqueue(
                &queue_name,
                QueuedMessage {
                    routing_key: routing_key.to_string(),
                    data: data.to_vec(),
                    message_id: Uuid::new_v4().to_string(),
                    retry_count: 0,
                    redelivered: false,
                },
            );
        }
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryMessageBroker {
    async fn declare_queue(
        &self,
        queue_name: &str,
        binding_key: &str,
    ) -> Result<(), MessageBrokerError> {
        self.ensure_connected()?;

        let mut state = self.state.lock().await;
        let queue = state.queues.entry(queue_name.to_string()).or_default();
        if !queue.binding_keys.iter().any(|key| key == binding_key) {
            queue.binding_keys.push(binding_key.to_string());
        }
        state
            .queues
            .entry(dead_letter_queue_name(queue_name))
            .or_default();

        Ok(())
    }

    async fn publish_to_queue(
        &self,
        queue_name: &str,
        routing_key: &str,
        data: &[u8],
        retry_count: u32,
    ) -> Result<(), MessageBrokerError> {
        self.ensure_connected()?;

        let mut state = self.state.lock().await;
        state.enqueue(
            queue_name,
            QueuedMessage {
                routing_key: routing_key.to_string(),
                data: data.to_vec(),
                message_id: Uuid::new_v4().to_string(),
                retry_count,
                redelivered: false,
            },
        );
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(
        &self,
        queue_name: &str,
        prefetch_count: u16,
    ) -> Result<DeliveryStream, MessageBrokerError> {
        self.ensure_connected()?;

        let broker = self.clone();
        let queue_name = queue_name.to_string();
        // Same meaning as AMQP: 0 is no limit
        let prefetch_limit = match prefetch_count {
            0 => usize::MAX,
            count => usize::from(count),
        };

        let deliveries = futures::stream::unfold(broker, move |broker| {
            let queue_name = queue_name.clone();

            async move {
                let notify = broker.notify.clone();
                loop {
                    // Registered before checking the state so no wake up is missed
                    let notified = notify.notified();

                    if broker.is_disconnected() {
                        return None;
                    }

                    if let Some(message) = broker.next_delivery(&queue_name, prefetch_limit).await
                    {
                        return Some((Ok(message), broker));
                    }

                    notified.await;
                }
            }
        })
        .boxed();

        Ok(deliveries)
    }

    async fn disconnect(&self) -> Result<(), MessageBrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }
}

impl InMemoryMessageBroker {
    async fn next_delivery(&self, queue_name: &str, prefetch_limit: usize) -> Option<IncomingMessage> {
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(queue_name.to_string()).or_default();

        if queue.outstanding >= prefetch_limit {
            return None;
        }

        let message = queue.ready.pop_front()?;
        queue.outstanding += 1;
        queue.max_outstanding = queue.max_outstanding.max(queue.outstanding);

        let acker = InMemoryAcker {
            broker: self.clone(),
            queue_name: queue_name.to_string(),
            message: message.clone(),
            settled: AtomicBool::new(false),
        };

        Some(IncomingMessage::new(
            message.routing_key,
            message.data,
            Some(message.message_id),
            message.retry_count,
            message.redelivered,
            Box::new(acker),
        ))
    }
}

struct InMemoryAcker {
    broker: InMemoryMessageBroker,
    queue_name: String,
    message: QueuedMessage,
    settled: AtomicBool,
}

impl InMemoryAcker {
    fn settle(&self) -> Result<(), MessageBrokerError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(MessageBrokerError::ChannelInternalError(format!(
                "Message {} was already acknowledged",
                self.message.message_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageAcker for InMemoryAcker {
    async fn ack(&self) -> Result<(), MessageBrokerError> {
        self.settle()?;

        let mut state = self.broker.state.lock().await;
        let queue = state.queues.entry(self.queue_name.clone()).or_default();
        queue.outstanding = queue.outstanding.saturating_sub(1);
        queue.acked += 1;
        drop(state);

        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), MessageBrokerError> {
        self.settle()?;

        let mut state = self.broker.state.lock().await;
        let queue = state.queues.entry(self.queue_name.clone()).or_default();
        queue.outstanding = queue.outstanding.saturating_sub(1);
        if requeue {
            queue.requeued += 1;
            queue.ready.push_front(QueuedMessage {
                redelivered: true,
                ..self.message.clone()
            });
        } else {
            queue.dropped += 1;
        }
        drop(state);

        self.broker.notify.notify_waiters();
        Ok(())
    }
}
