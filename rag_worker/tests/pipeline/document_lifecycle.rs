use common::dtos::{
    document_events::{
        DocumentDeletedDto, DocumentEnrichedDto, DocumentReprocessDto, DocumentUploadedDto,
    },
    status_events::DocumentProcessingStatus,
};
use fake::{faker::lorem::en::Sentences, Fake};
use rag_worker::{
    configuration::Stage, domain::entities::document::Document,
    ports::chunk_repository::ChunkRepository,
};
use serde_json::json;

use crate::helpers::{spawn_app, three_chunks_text, wait_until, TestApp};

/// Uploads a document and waits for every stage to be done with it
async fn ingest(app: &TestApp, filename: &str, content: &str) -> Document {
    let document = app.seed_document(filename, content).await;
    app.publish(&DocumentUploadedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        filename: document.filename.clone(),
        storage_path: document.storage_path.clone(),
        metadata: json!({}),
    })
    .await;

    let enriched = wait_until(|| async {
        app.published::<DocumentEnrichedDto>()
            .await
            .iter()
            .any(|event| event.document_id == document.id)
    })
    .await;
    assert!(enriched, "The document was not ingested");

    document
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_document_leaves_nothing_behind() {
    // Arrange
    let app = spawn_app().await;
    let document = ingest(&app, "notes.md", &three_chunks_text()).await;
    assert!(app.graph.node_count().await > 0);

    // Act
    app.publish(&DocumentDeletedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        metadata: json!({}),
    })
    .await;

    // Assert
    assert!(wait_until(|| async { app.get_document(document.id).await.is_none() }).await);
    assert_eq!(app.vector_store.document_point_count(document.id).await, 0);
    assert!(app
        .chunks
        .get_document_chunks(document.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(app.graph.node_count().await, 0);
    assert_eq!(app.graph.edge_count().await, 0);

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_a_deleted_document_is_acknowledged() {
    // Arrange
    let app = spawn_app().await;
    let content = Sentences(3..6).fake::<Vec<String>>().join(" ");
    let document = app.seed_document("notes.md", &content).await;
    let deletion_queue = app.queue_name(Stage::Deletion);
    let event = DocumentDeletedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        metadata: json!({}),
    };

    // Act
    app.publish(&event).await;
    app.publish(&event).await;

    // Assert
    assert!(wait_until(|| async { app.broker.acked_count(&deletion_queue).await == 2 }).await);
    assert_eq!(app.broker.requeued_count(&deletion_queue).await, 0);
    assert!(app.get_document(document.id).await.is_none());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reprocessed_document_replaces_its_chunks_and_vectors() {
    // Arrange
    let app = spawn_app().await;
    let document = ingest(&app, "notes.md", &three_chunks_text()).await;
    assert_eq!(app.vector_store.document_point_count(document.id).await, 3);

    // The source file was replaced by a shorter one
    app.source_files
        .put(&document.storage_path, "Ferris moved to Crab Harbor.")
        .await;

    // Act
    app.publish(&DocumentReprocessDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        metadata: json!({}),
    })
    .await;

    // Assert
    let reprocessed = wait_until(|| async {
        app.get_document(document.id)
            .await
            .map(|document| {
                document.processing_status == DocumentProcessingStatus::Ready
                    && document.chunk_count == Some(1)
            })
            .unwrap_or(false)
    })
    .await;
    assert!(reprocessed);

    assert_eq!(app.vector_store.document_point_count(document.id).await, 1);
    let chunks = app.chunks.get_document_chunks(document.id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Ferris moved to Crab Harbor.");

    let uploads = app.published::<DocumentUploadedDto>().await;
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[1].storage_path, document.storage_path);

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn document_being_processed_is_not_reprocessed() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    let update = app
        .status_service
        .update_document_status(document.id, DocumentProcessingStatus::Processing, None, None)
        .await
        .unwrap();
    assert!(update.is_updated());
    let reprocess_queue = app.queue_name(Stage::Reprocess);

    // Act
    app.publish(&DocumentReprocessDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        metadata: json!({}),
    })
    .await;

    // Assert
    assert!(wait_until(|| async { app.broker.acked_count(&reprocess_queue).await == 1 }).await);
    assert!(app.published::<DocumentUploadedDto>().await.is_empty());
    let stored = app.get_document(document.id).await.unwrap();
    assert_eq!(stored.processing_status, DocumentProcessingStatus::Processing);

    app.stop().await;
}
