use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::event_payload::EventPayload;
use crate::constants::routing_keys::{QUERY_PREPARE_ROUTING_KEY, QUERY_READY_ROUTING_KEY};

/// Retrieval strategy used to assemble a query context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RagType {
    /// Vector similarity only
    #[default]
    Vector,
    /// Vector similarity extended with knowledge graph neighbours
    Graph,
}

/// A query queued for context preparation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryPrepareDto {
    pub query_id: Uuid,
    pub workspace_id: Uuid,
    pub query_text: String,
    #[serde(default)]
    pub rag_type: RagType,
    pub top_k: usize,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for QueryPrepareDto {
    const ROUTING_KEY: &'static str = QUERY_PREPARE_ROUTING_KEY;
}

/// The context of a queued query is stored under `context_key`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryReadyDto {
    pub query_id: Uuid,
    pub workspace_id: Uuid,
    pub context_key: String,
    pub chunk_count: usize,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for QueryReadyDto {
    const ROUTING_KEY: &'static str = QUERY_READY_ROUTING_KEY;
}
