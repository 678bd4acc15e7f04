use async_trait::async_trait;
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::entities::{chunk::Chunk, content_point::Embeddings};

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Inserts or replaces chunks, keyed by their id
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<(), RepositoryError>;

    /// Chunks found among `chunk_ids`, ordered by ordinal. Missing ids are skipped.
    async fn get_chunks(&self, chunk_ids: &[Uuid]) -> Result<Vec<Chunk>, RepositoryError>;

    /// Every chunk of a document, ordered by ordinal
    async fn get_document_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>, RepositoryError>;

    async fn set_embeddings(
        &self,
        embeddings: &[(Uuid, Embeddings)],
    ) -> Result<(), RepositoryError>;

    /// Returns the number of deleted chunks
    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<u64, RepositoryError>;
}
