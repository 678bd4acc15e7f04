use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::event_payload::EventPayload;
use crate::constants::routing_keys::{DOCUMENT_GRAPH_BUILD_ROUTING_KEY, GRAPH_UPDATED_ROUTING_KEY};

/// An entity found in a document, with the chunks mentioning it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExtractedEntityDto {
    pub name: String,
    pub chunk_ids: Vec<Uuid>,
}

/// Request to build the knowledge graph fragment of a document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentGraphBuildDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub entities: Vec<ExtractedEntityDto>,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentGraphBuildDto {
    const ROUTING_KEY: &'static str = DOCUMENT_GRAPH_BUILD_ROUTING_KEY;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphUpdatedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for GraphUpdatedDto {
    const ROUTING_KEY: &'static str = GRAPH_UPDATED_ROUTING_KEY;
}
