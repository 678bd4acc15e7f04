use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::DocumentEnrichedDto, event_payload::publish_event,
        graph_events::GraphUpdatedDto,
    },
};
use tracing::info;

use super::{parse_event, HandlerError};
use crate::{
    domain::services::enricher::Enricher,
    ports::{chunk_repository::ChunkRepository, document_repository::DocumentRepository},
};

/// Enrichment stage: stores the keywords and summary of the document
pub struct GraphUpdatedHandler {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    enricher: Arc<dyn Enricher>,
    publisher: Arc<dyn MessagePublisher>,
}

impl GraphUpdatedHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        enricher: Arc<dyn Enricher>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            documents,
            chunks,
            enricher,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on graph update",
        skip(self, event),
        fields(document_id = %event.document_id)
    )]
    pub async fn execute_handler(&self, event: &GraphUpdatedDto) -> Result<(), HandlerError> {
        let chunks = self.chunks.get_document_chunks(event.document_id).await?;
        let enrichment = self.enricher.enrich(&chunks);

        if !self
            .documents
            .set_enrichment(event.document_id, &enrichment)
            .await?
        {
            info!("Document was deleted, dropping its enrichment");
            return Ok(());
        }

        publish_event(
            self.publisher.as_ref(),
            &DocumentEnrichedDto {
                document_id: event.document_id,
                workspace_id: event.workspace_id,
                keywords: enrichment.keywords,
                summary: enrichment.summary,
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!("Successfully enriched document");
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for GraphUpdatedHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<GraphUpdatedDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
