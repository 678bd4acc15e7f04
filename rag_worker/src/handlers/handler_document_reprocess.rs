use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::{DocumentReprocessDto, DocumentUploadedDto},
        event_payload::publish_event,
    },
};
use tracing::{info, warn};

use super::{parse_event, HandlerError};
use crate::{
    domain::services::status_service::{StatusService, StatusUpdate},
    ports::{chunk_repository::ChunkRepository, graph_store::GraphStore, vector_store::VectorStore},
};

/// Reprocess stage: resets a settled document and uploads it again
pub struct DocumentReprocessHandler {
    status_service: Arc<StatusService>,
    chunks: Arc<dyn ChunkRepository>,
    graph: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStore>,
    publisher: Arc<dyn MessagePublisher>,
}

impl DocumentReprocessHandler {
    pub fn new(
        status_service: Arc<StatusService>,
        chunks: Arc<dyn ChunkRepository>,
        graph: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            status_service,
            chunks,
            graph,
            vector_store,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on document reprocessing",
        skip(self, event),
        fields(document_id = %event.document_id)
    )]
    pub async fn execute_handler(&self, event: &DocumentReprocessDto) -> Result<(), HandlerError> {
        let document = match self
            .status_service
            .reset_document_for_reprocessing(event.document_id)
            .await?
        {
            StatusUpdate::Updated(document) => document,
            StatusUpdate::NotFound => {
                info!("Document was deleted, nothing to reprocess");
                return Ok(());
            }
            StatusUpdate::Rejected(document) => {
                warn!(
                    status = %document.processing_status,
                    "Document is being processed, can not reprocess it"
                );
                return Ok(());
            }
        };

        // Chunk ids are derived from ordinals: a shorter content would leave stale chunks behind
        self.vector_store.delete_document(document.id).await?;
        self.chunks.delete_document_chunks(document.id).await?;
        self.graph.delete_document(document.id).await?;

        publish_event(
            self.publisher.as_ref(),
            &DocumentUploadedDto {
                document_id: document.id,
                workspace_id: document.workspace_id,
                filename: document.filename.clone(),
                storage_path: document.storage_path.clone(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!("Document queued for reprocessing");
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for DocumentReprocessHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<DocumentReprocessDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
