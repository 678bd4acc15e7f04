use common::{
    core::message_broker::dead_letter_queue_name,
    dtos::{
        document_events::{
            DocumentChunkedDto, DocumentEnrichedDto, DocumentUploadedDto, EmbeddingsGenerateDto,
            VectorIndexUpdatedDto,
        },
        graph_events::GraphUpdatedDto,
        status_events::{DocumentProcessingStatus, DocumentStatusUpdatedDto},
    },
};
use rag_worker::{
    configuration::Stage, domain::entities::document::Document,
    ports::document_repository::DocumentRepository,
};
use serde_json::json;
use uuid::Uuid;

use crate::helpers::{spawn_app, three_chunks_text, wait_until, TestApp, EMBEDDING_MODEL};

fn uploaded_event(document: &Document) -> DocumentUploadedDto {
    DocumentUploadedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        filename: document.filename.clone(),
        storage_path: document.storage_path.clone(),
        metadata: json!({ "source": "test" }),
    }
}

async fn wait_for_status(app: &TestApp, document_id: Uuid, status: DocumentProcessingStatus) -> bool {
    wait_until(|| async {
        app.get_document(document_id)
            .await
            .map(|document| document.processing_status == status)
            .unwrap_or(false)
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn uploaded_document_of_three_chunks_ends_ready() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;

    // Act
    app.publish(&uploaded_event(&document)).await;

    // Assert
    // Published after the ready status
    assert!(wait_until(|| async { app.published::<VectorIndexUpdatedDto>().await.len() == 1 }).await);

    let chunked = app.published::<DocumentChunkedDto>().await;
    assert_eq!(chunked.len(), 1);
    assert_eq!(chunked[0].chunk_ids.len(), 3);
    assert_eq!(chunked[0].chunk_count, 3);

    let generate = app.published::<EmbeddingsGenerateDto>().await;
    assert_eq!(generate.len(), 1);
    assert_eq!(generate[0].embedding_model, EMBEDDING_MODEL);

    let index_updated = app.published::<VectorIndexUpdatedDto>().await;
    assert_eq!(index_updated[0].chunk_count, 3);
    assert_eq!(index_updated[0].document_id, document.id);

    let stored = app.get_document(document.id).await.unwrap();
    assert_eq!(stored.chunk_count, Some(3));
    assert!(stored.content_hash.is_some());
    assert_eq!(app.vector_store.document_point_count(document.id).await, 3);

    let statuses: Vec<DocumentProcessingStatus> = app
        .published::<DocumentStatusUpdatedDto>()
        .await
        .into_iter()
        .map(|event| event.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            DocumentProcessingStatus::Processing,
            DocumentProcessingStatus::Ready
        ]
    );

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_document_goes_through_graph_and_enrichment_stages() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;

    // Act
    app.publish(&uploaded_event(&document)).await;

    // Assert
    assert!(wait_until(|| async { app.published::<DocumentEnrichedDto>().await.len() == 1 }).await);

    let graph_updated = app.published::<GraphUpdatedDto>().await;
    assert_eq!(graph_updated.len(), 1);
    assert!(graph_updated[0].node_count > 0);
    assert!(app.graph.node_count().await > 0);

    let enriched = app.published::<DocumentEnrichedDto>().await;
    assert!(enriched[0].keywords.iter().any(|keyword| keyword == "ferris"));

    let stored = app.get_document(document.id).await.unwrap();
    assert!(!stored.keywords.is_empty());
    assert!(stored.summary.is_some());
    // Enrichment does not touch the status
    assert_eq!(stored.processing_status, DocumentProcessingStatus::Ready);

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_extension_fails_document_and_acknowledges_message() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("picture.bmp", "not really a bitmap").await;
    let parse_queue = app.queue_name(Stage::Parse);

    // Act
    app.publish(&uploaded_event(&document)).await;

    // Assert
    assert!(wait_for_status(&app, document.id, DocumentProcessingStatus::Failed).await);
    assert!(wait_until(|| async { app.broker.acked_count(&parse_queue).await == 1 }).await);

    let stored = app.get_document(document.id).await.unwrap();
    let error = stored.error.expect("A failed document has an error");
    assert!(error.contains("Unsupported file type"), "Unexpected error: {}", error);

    assert_eq!(app.broker.requeued_count(&parse_queue).await, 0);
    assert!(app
        .broker
        .queued_messages(&dead_letter_queue_name(&parse_queue))
        .await
        .is_empty());
    assert!(app.published::<DocumentChunkedDto>().await.is_empty());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_source_file_fails_document() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    app.source_files.remove(&document.storage_path).await;

    // Act
    app.publish(&uploaded_event(&document)).await;

    // Assert
    assert!(wait_for_status(&app, document.id, DocumentProcessingStatus::Failed).await);
    let stored = app.get_document(document.id).await.unwrap();
    assert!(stored.error.unwrap().contains("Source file not found"));

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn event_of_a_deleted_document_is_acknowledged_without_effect() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    app.documents.delete(document.id).await.unwrap();
    let parse_queue = app.queue_name(Stage::Parse);

    // Act
    app.publish(&uploaded_event(&document)).await;

    // Assert
    assert!(wait_until(|| async { app.broker.acked_count(&parse_queue).await == 1 }).await);
    assert_eq!(app.broker.requeued_count(&parse_queue).await, 0);
    assert!(app.published::<DocumentChunkedDto>().await.is_empty());
    assert!(app.published::<DocumentStatusUpdatedDto>().await.is_empty());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn redelivered_embeddings_generation_keeps_one_vector_per_chunk() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    app.publish(&uploaded_event(&document)).await;
    assert!(wait_for_status(&app, document.id, DocumentProcessingStatus::Ready).await);
    let embed_queue = app.queue_name(Stage::Embed);
    let generate = app.published::<EmbeddingsGenerateDto>().await.remove(0);

    // Act
    app.publish(&generate).await;

    // Assert
    assert!(wait_until(|| async { app.broker.acked_count(&embed_queue).await == 2 }).await);
    assert_eq!(app.vector_store.document_point_count(document.id).await, 3);
    assert_eq!(app.vector_store.len().await, 3);
    let stored = app.get_document(document.id).await.unwrap();
    assert_eq!(stored.processing_status, DocumentProcessingStatus::Ready);
    assert_eq!(stored.chunk_count, Some(3));

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn embeddings_generation_for_another_model_is_dead_lettered() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    let embed_queue = app.queue_name(Stage::Embed);

    // Act
    app.publish(&EmbeddingsGenerateDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        chunk_ids: vec![Uuid::new_v4()],
        embedding_model: "another-model".to_string(),
        metadata: json!({}),
    })
    .await;

    // Assert
    let dead_letter_queue = dead_letter_queue_name(&embed_queue);
    assert!(wait_until(|| async {
        app.broker.queued_messages(&dead_letter_queue).await.len() == 1
    })
    .await);
    assert_eq!(app.broker.requeued_count(&embed_queue).await, 0);
    assert!(app.vector_store.is_empty().await);

    app.stop().await;
}
