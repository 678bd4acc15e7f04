use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::message_worker::{MessageProcessor, ProcessingError},
    dtos::{status_events::WorkspaceStatus, workspace_events::WorkspaceProvisionDto},
};
use tracing::{error, info};

use super::{parse_event, HandlerError};
use crate::{
    domain::{
        entities::workspace::Workspace,
        services::status_service::{StatusService, StatusUpdate},
    },
    ports::{document_repository::WorkspaceRepository, vector_store::VectorStore},
};

/// Workspace provisioning stage: prepares the vector collection of a new workspace
pub struct WorkspaceProvisionHandler {
    workspaces: Arc<dyn WorkspaceRepository>,
    vector_store: Arc<dyn VectorStore>,
    status_service: Arc<StatusService>,
}

impl WorkspaceProvisionHandler {
    pub fn new(
        workspaces: Arc<dyn WorkspaceRepository>,
        vector_store: Arc<dyn VectorStore>,
        status_service: Arc<StatusService>,
    ) -> Self {
        Self {
            workspaces,
            vector_store,
            status_service,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on workspace provisioning",
        skip(self, event),
        fields(workspace_id = %event.workspace_id)
    )]
    pub async fn execute_handler(&self, event: &WorkspaceProvisionDto) -> Result<(), HandlerError> {
        self.workspaces
            .insert_if_missing(&Workspace::new(
                event.workspace_id,
                event.user_id,
                &event.name,
            ))
            .await?;

        let (status, message) = match self.vector_store.ensure_collection().await {
            Ok(()) => (WorkspaceStatus::Ready, None),
            Err(e) => {
                error!(error = ?e, "Failed to provision the vector collection");
                (
                    WorkspaceStatus::Error,
                    Some(format!("Vector collection provisioning failed: {}", e)),
                )
            }
        };

        match self
            .status_service
            .update_workspace_status(event.workspace_id, status, message)
            .await?
        {
            StatusUpdate::Updated(workspace) => {
                info!(status = %workspace.status, "Workspace provisioned")
            }
            StatusUpdate::NotFound => info!("Workspace was deleted while being provisioned"),
            StatusUpdate::Rejected(workspace) => {
                info!(status = %workspace.status, "Workspace was already provisioned")
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for WorkspaceProvisionHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<WorkspaceProvisionDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
