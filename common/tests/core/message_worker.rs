use std::{sync::atomic::Ordering, sync::Arc, time::Duration};

use claims::{assert_err, assert_ok};
use common::core::{
    in_memory_message_broker::InMemoryMessageBroker,
    message_broker::{dead_letter_queue_name, MessagePublisher},
    message_worker::{MessageWorker, RetryPolicy, WorkerSettings},
};

use crate::helpers::{
    init_test, spawn_worker, wait_until, FailingConsumerBroker, Script, ScriptedProcessor,
    BINDING_KEY, QUEUE_NAME,
};

#[tokio::test(flavor = "multi_thread")]
async fn worker_acknowledges_successfully_processed_messages() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::Succeed));
    let worker = spawn_worker(&broker, processor.clone(), 1, RetryPolicy::default()).await;

    for i in 0..3 {
        broker
            .publish(BINDING_KEY, format!("{{\"n\":{}}}", i).as_bytes())
            .await
            .unwrap();
    }

    let all_acked = wait_until(|| async { broker.acked_count(QUEUE_NAME).await == 3 }).await;
    assert!(all_acked);
    assert_eq!(processor.processed_count().await, 3);
    assert_eq!(broker.outstanding(QUEUE_NAME).await, 0);

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn prefetch_of_one_never_leaves_more_than_one_message_unacknowledged() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(
        ScriptedProcessor::new(Script::Succeed).with_processing_time(Duration::from_millis(10)),
    );
    let worker = spawn_worker(&broker, processor.clone(), 1, RetryPolicy::default()).await;

    for i in 0..20 {
        broker
            .publish(BINDING_KEY, i.to_string().as_bytes())
            .await
            .unwrap();
    }

    let all_acked = wait_until(|| async { broker.acked_count(QUEUE_NAME).await == 20 }).await;
    assert!(all_acked);
    assert_eq!(broker.max_outstanding(QUEUE_NAME).await, 1);
    assert_eq!(processor.max_in_flight.load(Ordering::SeqCst), 1);

    // Processed in publication order
    let processed = processor.processed.lock().await.clone();
    let expected: Vec<Vec<u8>> = (0..20).map(|i| i.to_string().into_bytes()).collect();
    assert_eq!(processed, expected);

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn retryable_failure_is_requeued_without_retry_policy() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::FailRetryable));
    let worker = spawn_worker(&broker, processor.clone(), 1, RetryPolicy::requeue_forever()).await;

    broker.publish(BINDING_KEY, b"retry me").await.unwrap();

    let requeued = wait_until(|| async { broker.requeued_count(QUEUE_NAME).await >= 3 }).await;
    assert!(requeued);
    assert_eq!(broker.acked_count(QUEUE_NAME).await, 0);
    assert!(broker
        .queued_messages(&dead_letter_queue_name(QUEUE_NAME))
        .await
        .is_empty());

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn retryable_failure_is_dead_lettered_after_max_retries() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::FailRetryable));
    let worker = spawn_worker(
        &broker,
        processor.clone(),
        1,
        RetryPolicy::dead_letter_after(2),
    )
    .await;

    broker.publish(BINDING_KEY, b"poison").await.unwrap();

    let dead_letter_queue = dead_letter_queue_name(QUEUE_NAME);
    let dead_lettered = wait_until(|| async {
        broker.queued_messages(&dead_letter_queue).await.len() == 1
    })
    .await;
    assert!(dead_lettered);

    // First attempt and 2 retries
    assert_eq!(processor.processed_count().await, 3);
    assert_eq!(
        broker.queued_messages(&dead_letter_queue).await,
        vec![b"poison".to_vec()]
    );
    assert!(broker.queued_messages(QUEUE_NAME).await.is_empty());
    assert_eq!(broker.requeued_count(QUEUE_NAME).await, 0);

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_message_is_dead_lettered_immediately() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::Reject));
    let worker = spawn_worker(
        &broker,
        processor.clone(),
        1,
        RetryPolicy::dead_letter_after(5),
    )
    .await;

    broker.publish(BINDING_KEY, b"not json").await.unwrap();

    let dead_letter_queue = dead_letter_queue_name(QUEUE_NAME);
    let dead_lettered = wait_until(|| async {
        broker.queued_messages(&dead_letter_queue).await.len() == 1
    })
    .await;
    assert!(dead_lettered);
    assert_eq!(processor.processed_count().await, 1);
    assert_eq!(broker.acked_count(QUEUE_NAME).await, 1);

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_worker_finishes_in_flight_message_and_disconnects() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(
        ScriptedProcessor::new(Script::Succeed).with_processing_time(Duration::from_millis(300)),
    );
    let worker = spawn_worker(&broker, processor.clone(), 1, RetryPolicy::default()).await;

    broker.publish(BINDING_KEY, b"first").await.unwrap();
    broker.publish(BINDING_KEY, b"second").await.unwrap();

    let started = wait_until(|| async { broker.outstanding(QUEUE_NAME).await == 1 }).await;
    assert!(started);
    worker.shutdown_token.cancel();
    // Stopping twice is harmless
    worker.shutdown_token.cancel();

    assert_ok!(worker.handle.await.unwrap());

    // The in-flight message was acknowledged, the next one stays in the queue
    assert_eq!(broker.acked_count(QUEUE_NAME).await, 1);
    assert_eq!(processor.processed_count().await, 1);
    assert_eq!(
        broker.queued_messages(QUEUE_NAME).await,
        vec![b"second".to_vec()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn messages_not_matching_the_binding_key_are_not_consumed() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::Succeed));
    let worker = spawn_worker(&broker, processor.clone(), 1, RetryPolicy::default()).await;

    broker.publish("other.event", b"ignored").await.unwrap();
    broker.publish(BINDING_KEY, b"consumed").await.unwrap();

    let acked = wait_until(|| async { broker.acked_count(QUEUE_NAME).await == 1 }).await;
    assert!(acked);
    assert_eq!(
        *processor.processed.lock().await,
        vec![b"consumed".to_vec()]
    );

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn retried_message_keeps_its_routing_key() {
    let broker = InMemoryMessageBroker::new();
    let processor = Arc::new(ScriptedProcessor::new(Script::FailRetryable));
    let worker = spawn_worker(
        &broker,
        processor.clone(),
        1,
        RetryPolicy::dead_letter_after(2),
    )
    .await;

    broker.publish(BINDING_KEY, b"retry me").await.unwrap();

    let dead_lettered = wait_until(|| async {
        broker
            .queued_messages(&dead_letter_queue_name(QUEUE_NAME))
            .await
            .len()
            == 1
    })
    .await;
    assert!(dead_lettered);
    assert_eq!(
        *processor.routing_keys.lock().await,
        vec![BINDING_KEY.to_string(); 3]
    );

    worker.shutdown_token.cancel();
    assert_ok!(worker.handle.await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_stops_with_an_error_when_its_consumer_fails() {
    init_test();
    let broker = Arc::new(FailingConsumerBroker::default());
    let processor = Arc::new(ScriptedProcessor::new(Script::Succeed));
    let settings = WorkerSettings {
        name: "failing_worker".to_string(),
        queue_name: QUEUE_NAME.to_string(),
        binding_key: BINDING_KEY.to_string(),
        prefetch_count: 1,
        retry_policy: RetryPolicy::default(),
    };
    let worker = MessageWorker::new(settings, broker.clone(), processor.clone());

    let result = tokio::time::timeout(Duration::from_secs(5), worker.start()).await;

    let result = assert_ok!(result, "The worker kept running on a failed consumer");
    assert_err!(result);
    assert_eq!(broker.disconnected.load(Ordering::SeqCst), 1);
    assert_eq!(processor.processed_count().await, 0);
}
