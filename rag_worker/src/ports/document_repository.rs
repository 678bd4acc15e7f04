use async_trait::async_trait;
use common::dtos::status_events::{DocumentProcessingStatus, WorkspaceStatus};
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::entities::{
    document::{Document, DocumentStatusChange, Enrichment},
    workspace::Workspace,
};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get(&self, document_id: Uuid) -> Result<Option<Document>, RepositoryError>;

    /// Inserts or replaces the whole document
    async fn save(&self, document: &Document) -> Result<(), RepositoryError>;

    /// Writes the status fields only if the stored status is still `expected_status`
    ///
    /// Returns the updated document, `None` if the document is missing or its status changed.
    async fn update_status(
        &self,
        document_id: Uuid,
        expected_status: DocumentProcessingStatus,
        change: &DocumentStatusChange,
    ) -> Result<Option<Document>, RepositoryError>;

    /// Returns `false` if the document is missing
    async fn set_content_hash(
        &self,
        document_id: Uuid,
        content_hash: &str,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` if the document is missing
    async fn set_enrichment(
        &self,
        document_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` if the document was already missing
    async fn delete(&self, document_id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn get(&self, workspace_id: Uuid) -> Result<Option<Workspace>, RepositoryError>;

    /// Inserts the workspace, an existing one is left untouched
    async fn insert_if_missing(&self, workspace: &Workspace) -> Result<(), RepositoryError>;

    /// Writes the status fields only if the stored status is still `expected_status`
    async fn update_status(
        &self,
        workspace_id: Uuid,
        expected_status: WorkspaceStatus,
        status: WorkspaceStatus,
        message: Option<&str>,
    ) -> Result<Option<Workspace>, RepositoryError>;
}
