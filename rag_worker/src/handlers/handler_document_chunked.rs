use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::{DocumentChunkedDto, EmbeddingsGenerateDto},
        event_payload::publish_event,
    },
};
use tracing::info;

use super::{parse_event, HandlerError};
use crate::{
    domain::services::embedding_encoder::EmbeddingEncoder,
    ports::{chunk_repository::ChunkRepository, document_repository::DocumentRepository},
};

/// Chunk stage: checks the chunks are stored and requests their embeddings
pub struct DocumentChunkedHandler {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    encoder: Arc<dyn EmbeddingEncoder>,
    publisher: Arc<dyn MessagePublisher>,
}

impl DocumentChunkedHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        encoder: Arc<dyn EmbeddingEncoder>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            documents,
            chunks,
            encoder,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on chunked document",
        skip(self, event),
        fields(document_id = %event.document_id, chunk_count = event.chunk_count)
    )]
    pub async fn execute_handler(&self, event: &DocumentChunkedDto) -> Result<(), HandlerError> {
        if self.documents.get(event.document_id).await?.is_none() {
            info!("Document was deleted, dropping its chunks");
            return Ok(());
        }

        let stored = self.chunks.get_chunks(&event.chunk_ids).await?;
        if stored.len() < event.chunk_ids.len() {
            return Err(HandlerError::MissingChunks {
                expected: event.chunk_ids.len(),
                found: stored.len(),
            });
        }

        publish_event(
            self.publisher.as_ref(),
            &EmbeddingsGenerateDto {
                document_id: event.document_id,
                workspace_id: event.workspace_id,
                chunk_ids: stored.iter().map(|chunk| chunk.id).collect(),
                embedding_model: self.encoder.model_name().to_string(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!("Requested embeddings of {} chunks", stored.len());
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for DocumentChunkedHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<DocumentChunkedDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
