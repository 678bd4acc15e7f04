use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::message_worker::{MessageProcessor, ProcessingError},
    dtos::document_events::DocumentDeletedDto,
};
use tracing::info;

use super::{parse_event, HandlerError};
use crate::ports::{
    chunk_repository::ChunkRepository, document_repository::DocumentRepository,
    graph_store::GraphStore, vector_store::VectorStore,
};

/// Deletion stage: removes everything derived from a document
///
/// Every step is idempotent, a partially done deletion is completed by the next delivery.
pub struct DocumentDeletedHandler {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    graph: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
}

impl DocumentDeletedHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        graph: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            documents,
            chunks,
            graph,
            vector_store,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on deleted document",
        skip(self, event),
        fields(document_id = %event.document_id)
    )]
    pub async fn execute_handler(&self, event: &DocumentDeletedDto) -> Result<(), HandlerError> {
        self.vector_store.delete_document(event.document_id).await?;
        let chunk_count = self
            .chunks
            .delete_document_chunks(event.document_id)
            .await?;
        self.graph.delete_document(event.document_id).await?;
        // Last: a redelivery still finds what is left to delete
        let was_stored = self.documents.delete(event.document_id).await?;

        info!(
            chunk_count,
            was_stored, "Successfully deleted document data"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for DocumentDeletedHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<DocumentDeletedDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
