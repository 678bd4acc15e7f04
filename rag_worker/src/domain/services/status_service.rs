use std::sync::Arc;

use common::{
    core::message_broker::MessagePublisher,
    dtos::{
        event_payload::{publish_event, PublishEventError},
        status_events::{DocumentProcessingStatus, WorkspaceStatus},
    },
    helper::error_chain_fmt,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::entities::{
        document::{Document, DocumentStatusChange},
        workspace::Workspace,
    },
    ports::{
        document_repository::{DocumentRepository, WorkspaceRepository},
        RepositoryError,
    },
};

/// Compare-and-set attempts before giving up on a status concurrently modified
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Outcome of a status update
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate<T> {
    /// Written and published, with the entity as stored
    Updated(T),
    NotFound,
    /// Invalid transition: nothing was written, carries the entity with its current status
    Rejected(T),
}

impl<T> StatusUpdate<T> {
    pub fn is_updated(&self) -> bool {
        matches!(self, StatusUpdate::Updated(_))
    }
}

/// Only writer of the document and workspace statuses
///
/// Every status written is published as a status updated event, when a publisher is set.
#[derive(Clone)]
pub struct StatusService {
    documents: Arc<dyn DocumentRepository>,
    workspaces: Arc<dyn WorkspaceRepository>,
    publisher: Option<Arc<dyn MessagePublisher>>,
}

impl StatusService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        workspaces: Arc<dyn WorkspaceRepository>,
    ) -> Self {
        Self {
            documents,
            workspaces,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    #[tracing::instrument(name = "Updating document status", skip(self, error))]
    pub async fn update_document_status(
        &self,
        document_id: Uuid,
        status: DocumentProcessingStatus,
        error: Option<String>,
        chunk_count: Option<u32>,
    ) -> Result<StatusUpdate<Document>, StatusServiceError> {
        let change = DocumentStatusChange {
            status,
            error,
            chunk_count,
        };

        self.write_document_status(document_id, &change, |current| {
            current.can_transition_to(status)
        })
        .await
    }

    /// Moves a settled document back to pending, clearing its error and chunk count
    #[tracing::instrument(name = "Resetting document for reprocessing", skip(self))]
    pub async fn reset_document_for_reprocessing(
        &self,
        document_id: Uuid,
    ) -> Result<StatusUpdate<Document>, StatusServiceError> {
        let change = DocumentStatusChange {
            status: DocumentProcessingStatus::Pending,
            error: None,
            chunk_count: None,
        };

        self.write_document_status(document_id, &change, |current| {
            current.can_be_reprocessed()
        })
        .await
    }

    async fn write_document_status(
        &self,
        document_id: Uuid,
        change: &DocumentStatusChange,
        is_allowed: impl Fn(DocumentProcessingStatus) -> bool,
    ) -> Result<StatusUpdate<Document>, StatusServiceError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let document = match self.documents.get(document_id).await? {
                Some(document) => document,
                None => {
                    info!("Document not found");
                    return Ok(StatusUpdate::NotFound);
                }
            };

            if !is_allowed(document.processing_status) {
                warn!(
                    "Rejected transition of the document from {} to {}",
                    document.processing_status, change.status
                );
                return Ok(StatusUpdate::Rejected(document));
            }

            // `None`: the status changed since it was read
            if let Some(document) = self
                .documents
                .update_status(document_id, document.processing_status, change)
                .await?
            {
                if let Some(publisher) = &self.publisher {
                    publish_event(publisher.as_ref(), &document.status_updated_event()).await?;
                }

                info!("Document is now {}", document.processing_status);
                return Ok(StatusUpdate::Updated(document));
            }
        }

        Err(StatusServiceError::ConcurrentUpdates(document_id))
    }

    #[tracing::instrument(name = "Updating workspace status", skip(self, message))]
    pub async fn update_workspace_status(
        &self,
        workspace_id: Uuid,
        status: WorkspaceStatus,
        message: Option<String>,
    ) -> Result<StatusUpdate<Workspace>, StatusServiceError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let workspace = match self.workspaces.get(workspace_id).await? {
                Some(workspace) => workspace,
                None => {
                    info!("Workspace not found");
                    return Ok(StatusUpdate::NotFound);
                }
            };

            if !workspace.status.can_transition_to(status) {
                warn!(
                    "Rejected transition of the workspace from {} to {}",
                    workspace.status, status
                );
                return Ok(StatusUpdate::Rejected(workspace));
            }

            if let Some(workspace) = self
                .workspaces
                .update_status(workspace_id, workspace.status, status, message.as_deref())
                .await?
            {
                if let Some(publisher) = &self.publisher {
                    publish_event(publisher.as_ref(), &workspace.status_updated_event()).await?;
                }

                info!("Workspace is now {}", workspace.status);
                return Ok(StatusUpdate::Updated(workspace));
            }
        }

        Err(StatusServiceError::ConcurrentUpdates(workspace_id))
    }
}

#[derive(thiserror::Error)]
pub enum StatusServiceError {
    #[error(transparent)]
    RepositoryError(#[from] RepositoryError),
    #[error(transparent)]
    PublishEventError(#[from] PublishEventError),
    #[error("Status of {0} kept changing while being updated")]
    ConcurrentUpdates(Uuid),
}

impl std::fmt::Debug for StatusServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
