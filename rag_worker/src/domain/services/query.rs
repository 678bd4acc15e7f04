use std::sync::Arc;

use common::helper::error_chain_fmt;
use tracing::info;

use super::embedding_encoder::{EmbeddingEncoder, EmbeddingError};
use crate::{
    domain::entities::{content_point::SearchFilter, retrieval_result::RetrievalResult},
    ports::vector_store::{VectorStore, VectorStoreError},
};

/// Answers a query with the most relevant stored chunks
#[derive(Clone)]
pub struct QueryService {
    encoder: Arc<dyn EmbeddingEncoder>,
    vector_store: Arc<dyn VectorStore>,
}

impl QueryService {
    pub fn new(encoder: Arc<dyn EmbeddingEncoder>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            encoder,
            vector_store,
        }
    }

    /// Ranked matches of `text`, most relevant first
    #[tracing::instrument(name = "Querying the vector store", skip(self))]
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievalResult>, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::BlankQuery);
        }
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }

        let vector = self.encoder.encode_one(text).await?;
        let matches = self.vector_store.search(&vector, top_k, filter).await?;

        if matches.is_empty() {
            return Err(QueryError::NoResults);
        }

        info!("Found {} matches", matches.len());
        Ok(matches.into_iter().map(RetrievalResult::from).collect())
    }
}

#[derive(thiserror::Error)]
pub enum QueryError {
    #[error("Query text is blank")]
    BlankQuery,
    #[error("top_k must be strictly positive")]
    InvalidTopK,
    #[error("No stored chunk matches the query")]
    NoResults,
    #[error(transparent)]
    EmbeddingError(#[from] EmbeddingError),
    #[error(transparent)]
    VectorStoreError(#[from] VectorStoreError),
}

impl std::fmt::Debug for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
