use std::sync::Arc;

use claims::assert_ok;
use common::core::{
    event_router::EventRouter,
    in_memory_message_broker::InMemoryMessageBroker,
    message_broker::MessagePublisher,
    message_worker::{MessageWorker, RetryPolicy, WorkerSettings},
};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::helpers::{init_test, wait_until, Script, ScriptedProcessor};

#[tokio::test(flavor = "multi_thread")]
async fn one_worker_per_route_receives_only_its_events() {
    init_test();
    let broker = InMemoryMessageBroker::new();
    let parse = Arc::new(ScriptedProcessor::new(Script::Succeed));
    let status = Arc::new(ScriptedProcessor::new(Script::Succeed));

    let mut router = EventRouter::new();
    router
        .register("parse", "document.uploaded", parse.clone())
        .unwrap();
    router
        .register("status_broadcast", "*.status.updated", status.clone())
        .unwrap();

    let shutdown_token = CancellationToken::new();
    let handles: Vec<_> = router
        .routes()
        .iter()
        .map(|route| {
            let settings = WorkerSettings {
                name: route.name.clone(),
                queue_name: format!("test_{}", route.name),
                binding_key: route.binding_key.clone(),
                prefetch_count: 1,
                retry_policy: RetryPolicy::default(),
            };
            let worker = MessageWorker::new(
                settings,
                Arc::new(broker.connection()),
                route.processor.clone(),
            )
            .with_shutdown_token(shutdown_token.clone());

            tokio::spawn(async move { worker.start().await })
        })
        .collect();

    let declared = wait_until(|| async {
        broker.is_queue_declared("test_parse").await
            && broker.is_queue_declared("test_status_broadcast").await
    })
    .await;
    assert!(declared);

    broker.publish("document.uploaded", b"upload").await.unwrap();
    broker
        .publish("document.status.updated", b"document status")
        .await
        .unwrap();
    broker
        .publish("workspace.status.updated", b"workspace status")
        .await
        .unwrap();

    let consumed = wait_until(|| async {
        parse.processed_count().await == 1 && status.processed_count().await == 2
    })
    .await;
    assert!(consumed);
    assert_eq!(*parse.processed.lock().await, vec![b"upload".to_vec()]);

    // A single token stops every worker
    shutdown_token.cancel();
    for result in join_all(handles).await {
        assert_ok!(result.unwrap());
    }
}
