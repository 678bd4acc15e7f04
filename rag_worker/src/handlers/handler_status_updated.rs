use std::sync::Arc;

use async_trait::async_trait;
use common::{
    constants::routing_keys::{
        DOCUMENT_STATUS_UPDATED_ROUTING_KEY, WORKSPACE_STATUS_UPDATED_ROUTING_KEY,
    },
    core::message_worker::{MessageProcessor, ProcessingError},
    dtos::status_events::{DocumentStatusUpdatedDto, WorkspaceStatusUpdatedDto},
};
use tracing::debug;

use super::{parse_event, HandlerError};
use crate::domain::services::status_broadcaster::{StatusBroadcaster, StatusNotification};

/// Status broadcast stage: mirrors status events to the channels of their users
pub struct StatusUpdatedHandler {
    broadcaster: Arc<StatusBroadcaster>,
}

impl StatusUpdatedHandler {
    pub fn new(broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self { broadcaster }
    }

    #[tracing::instrument(name = "Executing handler on status update", skip(self, data))]
    pub async fn execute_handler(&self, routing_key: &str, data: &[u8]) -> Result<(), HandlerError> {
        let notification = match routing_key {
            DOCUMENT_STATUS_UPDATED_ROUTING_KEY => {
                StatusNotification::DocumentStatus(parse_event::<DocumentStatusUpdatedDto>(data)?)
            }
            WORKSPACE_STATUS_UPDATED_ROUTING_KEY => StatusNotification::WorkspaceStatus(
                parse_event::<WorkspaceStatusUpdatedDto>(data)?,
            ),
            other => return Err(HandlerError::UnexpectedRoutingKey(other.to_string())),
        };

        let receivers = self.broadcaster.broadcast(notification).await;
        debug!(receivers, "Broadcast status");
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for StatusUpdatedHandler {
    async fn process_event(&self, routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        Ok(self.execute_handler(routing_key, data).await?)
    }
}
