use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        document_events::{DocumentChunkedDto, DocumentUploadedDto},
        event_payload::publish_event,
        status_events::DocumentProcessingStatus,
    },
};
use tracing::{info, warn};

use super::{parse_event, HandlerError};
use crate::{
    domain::{
        entities::parsed_document::SourceMetadata,
        services::{
            helpers::content_hash,
            indexer::{Indexer, IndexerError},
            status_service::{StatusService, StatusUpdate},
        },
    },
    ports::{
        chunk_repository::ChunkRepository,
        document_repository::DocumentRepository,
        source_file_repository::{SourceFileError, SourceFileRepository},
    },
};

/// Parse stage: reads the uploaded file, parses and chunks it
pub struct DocumentUploadedHandler {
    indexer: Arc<Indexer>,
    status_service: Arc<StatusService>,
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    source_files: Arc<dyn SourceFileRepository>,
    publisher: Arc<dyn MessagePublisher>,
}

impl DocumentUploadedHandler {
    pub fn new(
        indexer: Arc<Indexer>,
        status_service: Arc<StatusService>,
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        source_files: Arc<dyn SourceFileRepository>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            indexer,
            status_service,
            documents,
            chunks,
            source_files,
            publisher,
        }
    }

    /// Content errors mark the document as failed: the message is then done with
    async fn fail_document(
        &self,
        event: &DocumentUploadedDto,
        error: String,
    ) -> Result<(), HandlerError> {
        warn!(error = %error, "Document can not be ingested");

        let _ = self
            .status_service
            .update_document_status(
                event.document_id,
                DocumentProcessingStatus::Failed,
                Some(error),
                None,
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(
        name = "Executing handler on uploaded document",
        skip(self, event),
        fields(document_id = %event.document_id, filename = %event.filename)
    )]
    pub async fn execute_handler(&self, event: &DocumentUploadedDto) -> Result<(), HandlerError> {
        match self
            .status_service
            .update_document_status(
                event.document_id,
                DocumentProcessingStatus::Processing,
                None,
                None,
            )
            .await?
        {
            StatusUpdate::Updated(_) => (),
            StatusUpdate::NotFound => {
                info!("Document was deleted, dropping the upload");
                return Ok(());
            }
            StatusUpdate::Rejected(document) => {
                info!(
                    status = %document.processing_status,
                    "Document is not waiting to be processed, dropping the upload"
                );
                return Ok(());
            }
        }

        let raw = match self.source_files.read(&event.storage_path).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return self
                    .fail_document(
                        event,
                        format!("Source file not found: {}", event.storage_path),
                    )
                    .await
            }
            Err(SourceFileError::InvalidPath(path)) => {
                return self
                    .fail_document(event, format!("Invalid storage path: {}", path))
                    .await
            }
            Err(error) => return Err(error.into()),
        };

        let hash = content_hash(&raw);
        if !self
            .documents
            .set_content_hash(event.document_id, &hash)
            .await?
        {
            info!("Document was deleted while being parsed");
            return Ok(());
        }

        let source = SourceMetadata {
            document_id: event.document_id,
            workspace_id: event.workspace_id,
            filename: event.filename.clone(),
            metadata: event.metadata.clone(),
        };
        let (document, chunks) = match self.indexer.prepare(&raw, &source) {
            Ok(prepared) => prepared,
            Err(IndexerError::ParsingError(error)) => {
                return self.fail_document(event, error.to_string()).await
            }
            Err(error) => return Err(error.into()),
        };

        self.chunks.save_chunks(&chunks).await?;
        if self.documents.get(event.document_id).await?.is_none() {
            info!("Document was deleted while being chunked, removing its chunks");
            self.chunks.delete_document_chunks(event.document_id).await?;
            return Ok(());
        }

        publish_event(
            self.publisher.as_ref(),
            &DocumentChunkedDto {
                document_id: event.document_id,
                workspace_id: event.workspace_id,
                chunk_ids: chunks.iter().map(|chunk| chunk.id).collect(),
                chunk_count: chunks.len(),
                metadata: document.metadata,
            },
        )
        .await?;

        info!(title = %document.title, "Successfully chunked document");
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for DocumentUploadedHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<DocumentUploadedDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
