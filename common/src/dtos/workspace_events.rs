use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::event_payload::EventPayload;
use crate::constants::routing_keys::WORKSPACE_PROVISION_ROUTING_KEY;

/// A workspace record was created and its resources must be provisioned
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkspaceProvisionDto {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for WorkspaceProvisionDto {
    const ROUTING_KEY: &'static str = WORKSPACE_PROVISION_ROUTING_KEY;
}
