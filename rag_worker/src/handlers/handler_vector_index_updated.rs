use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::VectorIndexUpdatedDto,
        event_payload::publish_event,
        graph_events::{DocumentGraphBuildDto, ExtractedEntityDto},
    },
};
use tracing::info;

use super::{parse_event, HandlerError};
use crate::{
    domain::services::entity_extractor::{EntityExtractor, ExtractedEntity},
    ports::{chunk_repository::ChunkRepository, document_repository::DocumentRepository},
};

/// Entity extraction stage: finds the entities named in the indexed chunks
pub struct VectorIndexUpdatedHandler {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    extractor: Arc<dyn EntityExtractor>,
    publisher: Arc<dyn MessagePublisher>,
}

impl VectorIndexUpdatedHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        extractor: Arc<dyn EntityExtractor>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            documents,
            chunks,
            extractor,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on vector index update",
        skip(self, event),
        fields(document_id = %event.document_id)
    )]
    pub async fn execute_handler(&self, event: &VectorIndexUpdatedDto) -> Result<(), HandlerError> {
        if self.documents.get(event.document_id).await?.is_none() {
            info!("Document was deleted, skipping entity extraction");
            return Ok(());
        }

        let chunks = self.chunks.get_document_chunks(event.document_id).await?;
        let entities = self.extractor.extract(&chunks);
        info!("Extracted {} entities", entities.len());

        publish_event(
            self.publisher.as_ref(),
            &DocumentGraphBuildDto {
                document_id: event.document_id,
                workspace_id: event.workspace_id,
                entities: entities.into_iter().map(ExtractedEntityDto::from).collect(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        Ok(())
    }
}

impl From<ExtractedEntity> for ExtractedEntityDto {
    fn from(entity: ExtractedEntity) -> Self {
        Self {
            name: entity.name,
            chunk_ids: entity.chunk_ids,
        }
    }
}

#[async_trait]
impl MessageProcessor for VectorIndexUpdatedHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<VectorIndexUpdatedDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
