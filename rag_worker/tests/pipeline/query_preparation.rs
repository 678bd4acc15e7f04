use claims::{assert_matches, assert_ok};
use common::{
    core::message_broker::dead_letter_queue_name,
    dtos::{
        document_events::DocumentUploadedDto,
        graph_events::GraphUpdatedDto,
        query_events::{QueryPrepareDto, QueryReadyDto, RagType},
    },
};
use rag_worker::{
    configuration::Stage,
    domain::{
        entities::{content_point::SearchFilter, parsed_document::SourceMetadata},
        services::query::QueryError,
    },
    ports::query_context_repository::QueryContextRepository,
};
use serde_json::json;
use uuid::Uuid;

use crate::helpers::{spawn_app, spawn_app_with_stages, wait_until, TestApp};

const GUIDE: &str = "Ferris the crab maintains the borrow checker in Rust Valley. \
Every morning the compiler team reviews lifetimes with Ferris. \
Tokio runtimes schedule asynchronous tasks across worker threads. \
Qdrant collections store dense vectors for similarity search. \
Lopdf extracts the text of every page of a portable document.";

fn source(workspace_id: Uuid) -> SourceMetadata {
    SourceMetadata {
        document_id: Uuid::new_v4(),
        workspace_id,
        filename: "guide.txt".to_string(),
        metadata: json!({}),
    }
}

fn prepare_event(workspace_id: Uuid, query_text: &str, rag_type: RagType) -> QueryPrepareDto {
    QueryPrepareDto {
        query_id: Uuid::new_v4(),
        workspace_id,
        query_text: query_text.to_string(),
        rag_type,
        top_k: 3,
        metadata: json!({ "session": "test" }),
    }
}

async fn wait_for_ready(app: &TestApp, query_id: Uuid) -> QueryReadyDto {
    let published = wait_until(|| async {
        app.published::<QueryReadyDto>()
            .await
            .iter()
            .any(|event| event.query_id == query_id)
    })
    .await;
    assert!(published, "No query.ready event was published");

    app.published::<QueryReadyDto>()
        .await
        .into_iter()
        .find(|event| event.query_id == query_id)
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn querying_the_exact_text_of_an_indexed_chunk_ranks_it_first() {
    // Arrange
    let app = spawn_app_with_stages(&[Stage::Query]).await;
    let source = source(Uuid::new_v4());
    let (_, chunks) = app.indexer.prepare(GUIDE.as_bytes(), &source).unwrap();
    assert!(chunks.len() > 1);

    // Act
    let document = assert_ok!(app.indexer.index(GUIDE.as_bytes(), &source).await);
    let results = app
        .query_service
        .query(&chunks[1].text, 3, Some(&SearchFilter::workspace(source.workspace_id)))
        .await
        .unwrap();

    // Assert
    assert_eq!(document.chunk_count, Some(chunks.len()));
    assert_eq!(results[0].id, chunks[1].id);
    assert_eq!(results[0].payload.content, chunks[1].text);
    assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn query_of_an_empty_workspace_has_no_results() {
    // Arrange
    let app = spawn_app_with_stages(&[Stage::Query]).await;
    let indexed = source(Uuid::new_v4());
    app.indexer.index(GUIDE.as_bytes(), &indexed).await.unwrap();

    // Act
    let result = app
        .query_service
        .query("borrow checker", 3, Some(&SearchFilter::workspace(Uuid::new_v4())))
        .await;

    // Assert
    assert_matches!(result, Err(QueryError::NoResults));

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_vector_query_stores_its_context() {
    // Arrange
    let app = spawn_app().await;
    let workspace_id = Uuid::new_v4();
    app.indexer
        .index(GUIDE.as_bytes(), &source(workspace_id))
        .await
        .unwrap();
    let event = prepare_event(workspace_id, "Who maintains the borrow checker?", RagType::Vector);

    // Act
    app.publish(&event).await;

    // Assert
    let ready = wait_for_ready(&app, event.query_id).await;
    assert_eq!(ready.workspace_id, workspace_id);
    assert_eq!(ready.metadata, event.metadata);
    assert!(ready.chunk_count > 0 && ready.chunk_count <= 3);

    let context = app
        .query_contexts
        .get(&ready.context_key)
        .await
        .unwrap()
        .expect("The query context was not stored");
    assert_eq!(context.query_id, event.query_id);
    assert_eq!(context.results.len(), ready.chunk_count);
    assert!(context
        .results
        .iter()
        .all(|result| result.payload.workspace_id == workspace_id));
    assert!(context.related_entities.is_empty());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_query_of_an_empty_workspace_has_an_empty_context() {
    // Arrange
    let app = spawn_app().await;
    let event = prepare_event(Uuid::new_v4(), "Anything indexed?", RagType::Vector);

    // Act
    app.publish(&event).await;

    // Assert
    let ready = wait_for_ready(&app, event.query_id).await;
    assert_eq!(ready.chunk_count, 0);

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn prepared_graph_query_adds_related_entities() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("guide.txt", GUIDE).await;
    app.publish(&DocumentUploadedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        filename: document.filename.clone(),
        storage_path: document.storage_path.clone(),
        metadata: json!({}),
    })
    .await;
    let graph_built = wait_until(|| async {
        !app.published::<GraphUpdatedDto>().await.is_empty()
    })
    .await;
    assert!(graph_built);

    let event = prepare_event(
        document.workspace_id,
        "What does Ferris review?",
        RagType::Graph,
    );

    // Act
    app.publish(&event).await;

    // Assert
    let ready = wait_for_ready(&app, event.query_id).await;
    let context = app
        .query_contexts
        .get(&ready.context_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(context.rag_type, RagType::Graph);
    assert!(!context.results.is_empty());
    assert!(!context.related_entities.is_empty());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn blank_query_is_dead_lettered() {
    // Arrange
    let app = spawn_app().await;
    let query_queue = app.queue_name(Stage::Query);

    // Act
    app.publish(&prepare_event(Uuid::new_v4(), "   ", RagType::Vector))
        .await;

    // Assert
    let dead_letter_queue = dead_letter_queue_name(&query_queue);
    assert!(wait_until(|| async {
        app.broker.queued_messages(&dead_letter_queue).await.len() == 1
    })
    .await);
    assert!(app.published::<QueryReadyDto>().await.is_empty());

    app.stop().await;
}
