use common::helper::error_chain_fmt;

pub mod chunk_repository;
pub mod document_repository;
pub mod graph_store;
pub mod query_context_repository;
pub mod source_file_repository;
pub mod vector_store;

/// Error of a relational store
#[derive(thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
    #[error("Stored data is invalid: {0}")]
    InvalidData(String),
}

impl std::fmt::Debug for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
