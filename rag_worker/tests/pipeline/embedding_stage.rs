use std::sync::Arc;

use async_trait::async_trait;
use claims::{assert_err, assert_ok};
use common::{
    core::in_memory_message_broker::InMemoryMessageBroker,
    dtos::{
        document_events::{DocumentChunkedDto, DocumentUploadedDto, EmbeddingsGenerateDto},
        event_payload::EventPayload,
        status_events::DocumentProcessingStatus,
    },
};
use rag_worker::{
    configuration::get_configuration,
    domain::{
        entities::{
            chunk::Chunk,
            content_point::Embeddings,
            document::Document,
            parsed_document::SourceMetadata,
            workspace::Workspace,
        },
        services::{
            chunker::FixedSizeChunker,
            embedding_encoder::{EmbeddingEncoder, EmbeddingError, HashingEmbeddingEncoder},
            enricher::KeywordEnricher,
            entity_extractor::CapitalizedPhraseExtractor,
            indexer::Indexer,
            parser::SourceParser,
            status_service::StatusService,
        },
    },
    handlers::{
        handler_document_uploaded::DocumentUploadedHandler,
        handler_embeddings_generate::EmbeddingsGenerateHandler,
    },
    ports::{
        chunk_repository::ChunkRepository,
        document_repository::{DocumentRepository, WorkspaceRepository},
        RepositoryError,
    },
    repositories::{
        content_point_in_memory_repository::InMemoryVectorStore,
        in_memory_repositories::{
            InMemoryChunkRepository, InMemoryDocumentRepository, InMemoryGraphStore,
            InMemoryQueryContextRepository, InMemoryWorkspaceRepository,
        },
        source_file_in_memory_repository::SourceFileInMemoryRepository,
    },
    startup::{Application, ApplicationError, PipelineComponents},
};
use serde_json::json;
use uuid::Uuid;

use crate::helpers::{three_chunks_text, CHUNK_SIZE, EMBEDDING_DIMENSION, EMBEDDING_MODEL};

/// Deletes a document the first time it is asked for embeddings
struct DeletingEncoder {
    inner: HashingEmbeddingEncoder,
    documents: Arc<InMemoryDocumentRepository>,
    document_id: Uuid,
}

#[async_trait]
impl EmbeddingEncoder for DeletingEncoder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Embeddings>, EmbeddingError> {
        self.documents
            .delete(self.document_id)
            .await
            .expect("Failed to delete document");
        self.inner.encode(texts).await
    }
}

/// Deletes a document right after its chunks are saved
struct DeletingChunkRepository {
    inner: Arc<InMemoryChunkRepository>,
    documents: Arc<InMemoryDocumentRepository>,
}

#[async_trait]
impl ChunkRepository for DeletingChunkRepository {
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<(), RepositoryError> {
        self.inner.save_chunks(chunks).await?;
        for chunk in chunks {
            self.documents.delete(chunk.document_id).await?;
        }
        Ok(())
    }

    async fn get_chunks(&self, chunk_ids: &[Uuid]) -> Result<Vec<Chunk>, RepositoryError> {
        self.inner.get_chunks(chunk_ids).await
    }

    async fn get_document_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>, RepositoryError> {
        self.inner.get_document_chunks(document_id).await
    }

    async fn set_embeddings(
        &self,
        embeddings: &[(Uuid, Embeddings)],
    ) -> Result<(), RepositoryError> {
        self.inner.set_embeddings(embeddings).await
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<u64, RepositoryError> {
        self.inner.delete_document_chunks(document_id).await
    }
}

struct Stores {
    documents: Arc<InMemoryDocumentRepository>,
    workspaces: Arc<InMemoryWorkspaceRepository>,
    chunks: Arc<InMemoryChunkRepository>,
    source_files: Arc<SourceFileInMemoryRepository>,
    status_service: Arc<StatusService>,
    broker: Arc<InMemoryMessageBroker>,
}

impl Stores {
    fn new() -> Self {
        let documents = Arc::new(InMemoryDocumentRepository::default());
        let workspaces = Arc::new(InMemoryWorkspaceRepository::default());
        let broker = Arc::new(InMemoryMessageBroker::new());
        let status_service = Arc::new(
            StatusService::new(documents.clone(), workspaces.clone())
                .with_publisher(broker.clone()),
        );

        Self {
            documents,
            workspaces,
            chunks: Arc::new(InMemoryChunkRepository::default()),
            source_files: Arc::new(SourceFileInMemoryRepository::default()),
            status_service,
            broker,
        }
    }

    fn indexer(
        &self,
        encoder: Arc<dyn EmbeddingEncoder>,
        vector_store: Arc<InMemoryVectorStore>,
    ) -> Arc<Indexer> {
        Arc::new(Indexer::new(
            Arc::new(SourceParser::new()),
            Arc::new(FixedSizeChunker::try_new(CHUNK_SIZE, 0).unwrap()),
            encoder,
            vector_store,
        ))
    }

    fn embed_handler(&self, indexer: Arc<Indexer>) -> EmbeddingsGenerateHandler {
        EmbeddingsGenerateHandler::new(
            indexer,
            self.status_service.clone(),
            self.documents.clone(),
            self.chunks.clone(),
            self.broker.clone(),
        )
    }

    /// Stores a document being processed with its chunks, returns the embed event
    async fn chunked_document(&self, indexer: &Indexer) -> (Document, EmbeddingsGenerateDto) {
        let workspace = Workspace::new(Uuid::new_v4(), Uuid::new_v4(), "Test workspace");
        self.workspaces.insert_if_missing(&workspace).await.unwrap();
        let document_id = Uuid::new_v4();
        let document = Document::new(
            document_id,
            workspace.id,
            workspace.user_id,
            "notes.txt",
            &format!("{}/{}/notes.txt", workspace.id, document_id),
        );
        self.documents.save(&document).await.unwrap();
        assert_ok!(
            self.status_service
                .update_document_status(
                    document.id,
                    DocumentProcessingStatus::Processing,
                    None,
                    None
                )
                .await
        );

        let source = SourceMetadata {
            document_id: document.id,
            workspace_id: workspace.id,
            filename: document.filename.clone(),
            metadata: json!({}),
        };
        let (_, chunks) = indexer
            .prepare(three_chunks_text().as_bytes(), &source)
            .unwrap();
        self.chunks.save_chunks(&chunks).await.unwrap();

        let event = EmbeddingsGenerateDto {
            document_id: document.id,
            workspace_id: workspace.id,
            chunk_ids: chunks.iter().map(|chunk| chunk.id).collect(),
            embedding_model: EMBEDDING_MODEL.to_string(),
            metadata: json!({}),
        };
        (document, event)
    }
}

fn hashing_encoder() -> Arc<HashingEmbeddingEncoder> {
    Arc::new(HashingEmbeddingEncoder::new(EMBEDDING_MODEL, EMBEDDING_DIMENSION))
}

#[tokio::test]
async fn worker_refuses_to_start_when_encoder_and_store_dimensions_differ() {
    let stores = Stores::new();
    let mut settings = get_configuration().unwrap();
    settings.rabbitmq.queue_name_prefix = format!("test_{}", Uuid::new_v4());
    let components = PipelineComponents {
        documents: stores.documents.clone(),
        workspaces: stores.workspaces.clone(),
        chunks: stores.chunks.clone(),
        graph: Arc::new(InMemoryGraphStore::default()),
        query_contexts: Arc::new(InMemoryQueryContextRepository::default()),
        source_files: stores.source_files.clone(),
        vector_store: Arc::new(InMemoryVectorStore::new("test", EMBEDDING_DIMENSION / 2)),
        encoder: hashing_encoder(),
        chunker: Arc::new(FixedSizeChunker::try_new(CHUNK_SIZE, 0).unwrap()),
        parser: Arc::new(SourceParser::new()),
        extractor: Arc::new(CapitalizedPhraseExtractor::default()),
        enricher: Arc::new(KeywordEnricher::default()),
    };

    let result = Application::build_with(settings, components, stores.broker.as_ref()).await;

    assert!(matches!(
        result,
        Err(ApplicationError::DimensionMismatch {
            encoder: 64,
            vector_store: 32
        })
    ));
}

#[tokio::test]
async fn vectors_rejected_by_the_store_fail_the_document_without_retry() {
    let stores = Stores::new();
    let vector_store = Arc::new(InMemoryVectorStore::new("test", EMBEDDING_DIMENSION / 2));
    let indexer = stores.indexer(hashing_encoder(), vector_store.clone());
    let (document, event) = stores.chunked_document(&indexer).await;

    let error = assert_err!(stores.embed_handler(indexer).execute_handler(&event).await);

    assert!(!error.is_retryable());
    let document = stores.documents.get(document.id).await.unwrap().unwrap();
    assert_eq!(document.processing_status, DocumentProcessingStatus::Failed);
    assert!(document.error.is_some());
    assert!(vector_store.is_empty().await);
}

#[tokio::test]
async fn document_deleted_while_embedded_leaves_no_vectors_nor_chunks() {
    let stores = Stores::new();
    let vector_store = Arc::new(InMemoryVectorStore::new("test", EMBEDDING_DIMENSION));
    let preparing_indexer = stores.indexer(hashing_encoder(), vector_store.clone());
    let (document, event) = stores.chunked_document(&preparing_indexer).await;
    let encoder = Arc::new(DeletingEncoder {
        inner: HashingEmbeddingEncoder::new(EMBEDDING_MODEL, EMBEDDING_DIMENSION),
        documents: stores.documents.clone(),
        document_id: document.id,
    });
    let indexer = stores.indexer(encoder, vector_store.clone());

    assert_ok!(stores.embed_handler(indexer).execute_handler(&event).await);

    assert!(stores.documents.get(document.id).await.unwrap().is_none());
    assert_eq!(vector_store.document_point_count(document.id).await, 0);
    let chunks = stores.chunks.get_document_chunks(document.id).await.unwrap();
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn document_deleted_while_chunked_leaves_no_chunks() {
    let stores = Stores::new();
    let vector_store = Arc::new(InMemoryVectorStore::new("test", EMBEDDING_DIMENSION));
    let indexer = stores.indexer(hashing_encoder(), vector_store);
    let workspace = Workspace::new(Uuid::new_v4(), Uuid::new_v4(), "Test workspace");
    stores.workspaces.insert_if_missing(&workspace).await.unwrap();
    let document_id = Uuid::new_v4();
    let storage_path = format!("{}/{}/notes.txt", workspace.id, document_id);
    let document = Document::new(
        document_id,
        workspace.id,
        workspace.user_id,
        "notes.txt",
        &storage_path,
    );
    stores.documents.save(&document).await.unwrap();
    stores.source_files.put(&storage_path, three_chunks_text()).await;
    let handler = DocumentUploadedHandler::new(
        indexer,
        stores.status_service.clone(),
        stores.documents.clone(),
        Arc::new(DeletingChunkRepository {
            inner: stores.chunks.clone(),
            documents: stores.documents.clone(),
        }),
        stores.source_files.clone(),
        stores.broker.clone(),
    );

    let event = DocumentUploadedDto {
        document_id,
        workspace_id: workspace.id,
        filename: "notes.txt".to_string(),
        storage_path,
        metadata: json!({}),
    };
    assert_ok!(handler.execute_handler(&event).await);

    let chunks = stores.chunks.get_document_chunks(document_id).await.unwrap();
    assert!(chunks.is_empty());
    assert!(stores
        .broker
        .published_with_routing_key(DocumentChunkedDto::ROUTING_KEY)
        .await
        .is_empty());
}
