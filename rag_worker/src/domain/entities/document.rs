use chrono::{DateTime, Utc};
use common::dtos::status_events::{DocumentProcessingStatus, DocumentStatusUpdatedDto};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded document, tracked through the ingestion stages
///
/// Each stage writes its own fields only: the status fields are written by the status service,
/// the content hash by the parse stage and the enrichment by the enrichment stage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    /// Location of the source file in the blob storage
    pub storage_path: String,
    pub content_hash: Option<String>,
    pub processing_status: DocumentProcessingStatus,
    pub error: Option<String>,
    pub chunk_count: Option<u32>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document, waiting to be processed
    pub fn new(
        id: Uuid,
        workspace_id: Uuid,
        user_id: Uuid,
        filename: &str,
        storage_path: &str,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            workspace_id,
            user_id,
            filename: filename.to_string(),
            storage_path: storage_path.to_string(),
            content_hash: None,
            processing_status: DocumentProcessingStatus::Pending,
            error: None,
            chunk_count: None,
            keywords: vec![],
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status_updated_event(&self) -> DocumentStatusUpdatedDto {
        DocumentStatusUpdatedDto {
            document_id: self.id,
            user_id: self.user_id,
            workspace_id: self.workspace_id,
            status: self.processing_status,
            error: self.error.clone(),
            chunk_count: self.chunk_count,
            filename: self.filename.clone(),
        }
    }
}

/// Status fields written together by a status update
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStatusChange {
    pub status: DocumentProcessingStatus,
    pub error: Option<String>,
    pub chunk_count: Option<u32>,
}

/// Keywords and summary computed by the enrichment stage
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Enrichment {
    pub keywords: Vec<String>,
    pub summary: String,
}
