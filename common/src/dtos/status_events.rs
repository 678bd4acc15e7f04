use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event_payload::EventPayload;
use crate::constants::routing_keys::{
    DOCUMENT_STATUS_UPDATED_ROUTING_KEY, WORKSPACE_STATUS_UPDATED_ROUTING_KEY,
};

/// Processing state of a document
///
/// `Pending -> Processing -> {Ready, Failed}`. A document only goes back to `Pending`
/// through an explicit reprocessing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentProcessingStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentProcessingStatus {
    /// Whether a regular pipeline stage may move a document from `self` to `next`.
    ///
    /// Re-applying the current status is accepted so redelivered messages stay harmless.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DocumentProcessingStatus::*;

        matches!(
            (self, next),
            (Pending, Pending)
                | (Processing, Processing)
                | (Ready, Ready)
                | (Failed, Failed)
                | (Pending, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
        )
    }

    /// Whether a reprocessing request may reset a document in this status
    pub fn can_be_reprocessed(self) -> bool {
        matches!(
            self,
            DocumentProcessingStatus::Ready
                | DocumentProcessingStatus::Failed
                | DocumentProcessingStatus::Pending
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentProcessingStatus::Pending => "pending",
            DocumentProcessingStatus::Processing => "processing",
            DocumentProcessingStatus::Ready => "ready",
            DocumentProcessingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Invalid document processing status: {}", other)),
        }
    }
}

/// Provisioning state of a workspace, `Ready` and `Error` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Provisioning,
    Ready,
    Error,
}

impl WorkspaceStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || self == WorkspaceStatus::Provisioning
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceStatus::Provisioning => "provisioning",
            WorkspaceStatus::Ready => "ready",
            WorkspaceStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkspaceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(Self::Provisioning),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(format!("Invalid workspace status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentStatusUpdatedDto {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub status: DocumentProcessingStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub chunk_count: Option<u32>,
    pub filename: String,
}

impl EventPayload for DocumentStatusUpdatedDto {
    const ROUTING_KEY: &'static str = DOCUMENT_STATUS_UPDATED_ROUTING_KEY;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkspaceStatusUpdatedDto {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub name: String,
}

impl EventPayload for WorkspaceStatusUpdatedDto {
    const ROUTING_KEY: &'static str = WORKSPACE_STATUS_UPDATED_ROUTING_KEY;
}
