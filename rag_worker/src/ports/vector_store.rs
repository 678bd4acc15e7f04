use async_trait::async_trait;
use common::helper::error_chain_fmt;
use uuid::Uuid;

use crate::domain::entities::content_point::{ContentPoint, ScoredContentPoint, SearchFilter};

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Dimension of every vector of the collection
    fn dimension(&self) -> usize;

    /// Creates the collection if it does not exist yet
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Upserts points keyed by id
    async fn add(&self, points: Vec<ContentPoint>) -> Result<(), VectorStoreError>;

    /// At most `top_k` points, most relevant first
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredContentPoint>, VectorStoreError>;

    async fn delete_document(&self, document_id: Uuid) -> Result<(), VectorStoreError>;
}

#[derive(thiserror::Error)]
pub enum VectorStoreError {
    #[error("Error from the vector store: {0}")]
    BackendError(String),
    #[error("Vector store configuration error: {0}")]
    ConfigurationError(String),
    #[error("Expected vectors of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Stored point is invalid: {0}")]
    InvalidPoint(String),
}

impl VectorStoreError {
    /// Whether the error comes from the configuration, not from the backend availability
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            VectorStoreError::DimensionMismatch { .. } | VectorStoreError::ConfigurationError(_)
        )
    }
}

impl std::fmt::Debug for VectorStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
