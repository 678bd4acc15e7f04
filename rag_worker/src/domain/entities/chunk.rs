use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content_point::{ContentPoint, ContentPointPayload, Embeddings};

/// A piece of a document, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Chunk {
    /// Derived from the document id and the ordinal, so re-chunking gives the same ids
    pub id: Uuid,
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub ordinal: u32,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Embeddings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChunkMetadata {
    /// Offset of the first char in the document content, in chars
    pub start_offset: usize,
    /// Offset after the last char, in chars
    pub end_offset: usize,
    pub chunker: String,
}

impl Chunk {
    pub fn new(
        document_id: Uuid,
        workspace_id: Uuid,
        ordinal: u32,
        text: String,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: Self::id_for(document_id, ordinal),
            document_id,
            workspace_id,
            ordinal,
            text,
            metadata,
            embedding: None,
        }
    }

    pub fn id_for(document_id: Uuid, ordinal: u32) -> Uuid {
        Uuid::new_v5(&document_id, &ordinal.to_be_bytes())
    }

    /// The vector store point of an embedded chunk
    pub fn to_content_point(&self) -> Option<ContentPoint> {
        self.embedding.as_ref().map(|embedding| ContentPoint {
            id: self.id,
            vector: embedding.clone(),
            payload: ContentPointPayload {
                document_id: self.document_id,
                workspace_id: self.workspace_id,
                ordinal: self.ordinal,
                content: self.text.clone(),
            },
        })
    }
}
