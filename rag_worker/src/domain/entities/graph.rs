use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MENTIONED_IN_RELATION: &str = "MENTIONED_IN";
pub const CO_OCCURS_WITH_RELATION: &str = "CO_OCCURS_WITH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Entity,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Entity => "entity",
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "entity" => Ok(Self::Entity),
            other => Err(format!("Invalid graph node kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: NodeKind,
    pub label: String,
}

impl GraphNode {
    /// A document node shares the id of its document
    pub fn document(workspace_id: Uuid, document_id: Uuid, filename: &str) -> Self {
        Self {
            id: document_id,
            workspace_id,
            kind: NodeKind::Document,
            label: filename.to_string(),
        }
    }

    /// Entity nodes are shared by every document of a workspace mentioning the same label
    pub fn entity(workspace_id: Uuid, label: &str) -> Self {
        Self {
            id: Self::entity_id(workspace_id, label),
            workspace_id,
            kind: NodeKind::Entity,
            label: label.trim().to_string(),
        }
    }

    pub fn entity_id(workspace_id: Uuid, label: &str) -> Uuid {
        Uuid::new_v5(&workspace_id, normalize_label(label).as_bytes())
    }
}

/// Case and whitespace insensitive form of an entity label
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A relation found in one document. The same relation found in another document is another edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct GraphEdge {
    pub source: Uuid,
    pub target: Uuid,
    pub relation: String,
    pub document_id: Uuid,
    pub workspace_id: Uuid,
}
