use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Embeddings = Vec<f32>;

/// A chunk vector as stored in the vector store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentPoint {
    pub id: Uuid,
    pub payload: ContentPointPayload,
    pub vector: Embeddings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContentPointPayload {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub ordinal: u32,
    pub content: String,
}

/// A stored point matching a search, with its relevance score (higher is more relevant)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredContentPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: ContentPointPayload,
}

/// Restricts a vector search to a workspace and/or a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub workspace_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
}

impl SearchFilter {
    pub fn workspace(workspace_id: Uuid) -> Self {
        Self {
            workspace_id: Some(workspace_id),
            document_id: None,
        }
    }

    pub fn matches(&self, payload: &ContentPointPayload) -> bool {
        self.workspace_id
            .map_or(true, |workspace_id| payload.workspace_id == workspace_id)
            && self
                .document_id
                .map_or(true, |document_id| payload.document_id == document_id)
    }
}
