use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::event_payload::EventPayload;
use crate::constants::routing_keys::{
    DOCUMENT_CHUNKED_ROUTING_KEY, DOCUMENT_DELETED_ROUTING_KEY, DOCUMENT_ENRICHED_ROUTING_KEY,
    DOCUMENT_REPROCESS_ROUTING_KEY, DOCUMENT_UPLOADED_ROUTING_KEY,
    EMBEDDINGS_GENERATE_ROUTING_KEY, VECTOR_INDEX_UPDATED_ROUTING_KEY,
};

/// A source file was stored and its document record created
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentUploadedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub filename: String,
    /// Location of the source file in the blob storage
    pub storage_path: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentUploadedDto {
    const ROUTING_KEY: &'static str = DOCUMENT_UPLOADED_ROUTING_KEY;
}

/// The document was parsed and its chunks persisted
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentChunkedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
    pub chunk_count: usize,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentChunkedDto {
    const ROUTING_KEY: &'static str = DOCUMENT_CHUNKED_ROUTING_KEY;
}

/// Request to embed and index a set of chunks with a given model
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingsGenerateDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
    pub embedding_model: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for EmbeddingsGenerateDto {
    const ROUTING_KEY: &'static str = EMBEDDINGS_GENERATE_ROUTING_KEY;
}

/// The chunk vectors of a document were upserted in the vector store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VectorIndexUpdatedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub chunk_count: usize,
    pub collection_name: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for VectorIndexUpdatedDto {
    const ROUTING_KEY: &'static str = VECTOR_INDEX_UPDATED_ROUTING_KEY;
}

/// Keywords and summary computed for a document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentEnrichedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub keywords: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentEnrichedDto {
    const ROUTING_KEY: &'static str = DOCUMENT_ENRICHED_ROUTING_KEY;
}

/// The document record was removed, its derived data must follow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentDeletedDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentDeletedDto {
    const ROUTING_KEY: &'static str = DOCUMENT_DELETED_ROUTING_KEY;
}

/// Explicit request to run the whole ingestion again for a document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentReprocessDto {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl EventPayload for DocumentReprocessDto {
    const ROUTING_KEY: &'static str = DOCUMENT_REPROCESS_ROUTING_KEY;
}
