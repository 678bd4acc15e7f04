use chrono::{DateTime, Utc};
use common::dtos::status_events::{WorkspaceStatus, WorkspaceStatusUpdatedDto};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Workspace {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: WorkspaceStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: Uuid, user_id: Uuid, name: &str) -> Self {
        let now = Utc::now();

        Self {
            id,
            user_id,
            name: name.to_string(),
            status: WorkspaceStatus::Provisioning,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status_updated_event(&self) -> WorkspaceStatusUpdatedDto {
        WorkspaceStatusUpdatedDto {
            workspace_id: self.id,
            user_id: self.user_id,
            status: self.status,
            message: self.status_message.clone(),
            name: self.name.clone(),
        }
    }
}
