use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::{EmbeddingsGenerateDto, VectorIndexUpdatedDto},
        event_payload::publish_event,
        status_events::DocumentProcessingStatus,
    },
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{parse_event, HandlerError};
use crate::{
    domain::services::{
        indexer::Indexer,
        status_service::{StatusService, StatusUpdate},
    },
    ports::{chunk_repository::ChunkRepository, document_repository::DocumentRepository},
};

/// Embed stage: embeds the chunks, upserts their vectors and marks the document as ready
pub struct EmbeddingsGenerateHandler {
    indexer: Arc<Indexer>,
    status_service: Arc<StatusService>,
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    publisher: Arc<dyn MessagePublisher>,
}

impl EmbeddingsGenerateHandler {
    pub fn new(
        indexer: Arc<Indexer>,
        status_service: Arc<StatusService>,
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            indexer,
            status_service,
            documents,
            chunks,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on embeddings generation",
        skip(self, event),
        fields(document_id = %event.document_id, model = %event.embedding_model)
    )]
    pub async fn execute_handler(&self, event: &EmbeddingsGenerateDto) -> Result<(), HandlerError> {
        let configured_model = self.indexer.encoder().model_name();
        if event.embedding_model != configured_model {
            let error = HandlerError::EmbeddingModelMismatch {
                requested: event.embedding_model.clone(),
                configured: configured_model.to_string(),
            };
            let _ = self
                .status_service
                .update_document_status(
                    event.document_id,
                    DocumentProcessingStatus::Failed,
                    Some(error.to_string()),
                    None,
                )
                .await?;
            return Err(error);
        }

        if self.documents.get(event.document_id).await?.is_none() {
            info!("Document was deleted, dropping the embeddings generation");
            return Ok(());
        }

        let chunks = self.chunks.get_chunks(&event.chunk_ids).await?;
        if chunks.len() < event.chunk_ids.len() {
            return Err(HandlerError::MissingChunks {
                expected: event.chunk_ids.len(),
                found: chunks.len(),
            });
        }

        let chunks = match self.indexer.embed_and_store(chunks).await {
            Ok(chunks) => chunks,
            Err(error) if error.is_permanent() => {
                warn!(?error, "Chunks can never be indexed, marking the document as failed");
                let _ = self
                    .status_service
                    .update_document_status(
                        event.document_id,
                        DocumentProcessingStatus::Failed,
                        Some(error.to_string()),
                        None,
                    )
                    .await?;
                return Err(error.into());
            }
            Err(error) => return Err(error.into()),
        };
        let embeddings: Vec<_> = chunks
            .iter()
            .filter_map(|chunk| chunk.embedding.clone().map(|embedding| (chunk.id, embedding)))
            .collect();
        self.chunks.set_embeddings(&embeddings).await?;

        let document = match self
            .status_service
            .update_document_status(
                event.document_id,
                DocumentProcessingStatus::Ready,
                None,
                Some(chunks.len() as u32),
            )
            .await?
        {
            StatusUpdate::Updated(document) => document,
            StatusUpdate::NotFound => {
                info!("Document was deleted while being embedded, removing its vectors");
                self.remove_document_data(event.document_id).await?;
                return Ok(());
            }
            StatusUpdate::Rejected(document) => {
                warn!(
                    status = %document.processing_status,
                    "Document is not being processed anymore, not publishing the index update"
                );
                return Ok(());
            }
        };

        publish_event(
            self.publisher.as_ref(),
            &VectorIndexUpdatedDto {
                document_id: document.id,
                workspace_id: document.workspace_id,
                chunk_count: chunks.len(),
                collection_name: self.indexer.vector_store().collection_name().to_string(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!("Successfully indexed {} chunks", chunks.len());
        Ok(())
    }
}

impl EmbeddingsGenerateHandler {
    /// Vectors and chunks written for a document deleted in the meantime
    async fn remove_document_data(&self, document_id: Uuid) -> Result<(), HandlerError> {
        self.indexer
            .vector_store()
            .delete_document(document_id)
            .await?;
        self.chunks.delete_document_chunks(document_id).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for EmbeddingsGenerateHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<EmbeddingsGenerateDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
