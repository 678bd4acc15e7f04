//! Pipeline stages: one message processor per consumed routing key.
//!
//! Handlers tolerate out of order and repeated deliveries: a missing document is
//! acknowledged and dropped, missing chunks are retried later, and every write is
//! an upsert or a compare-and-set.

use common::{
    core::message_worker::ProcessingError,
    dtos::event_payload::{EventPayload, EventPayloadError, PublishEventError},
    helper::error_chain_fmt,
};

use crate::{
    domain::services::{
        indexer::IndexerError, query::QueryError, status_service::StatusServiceError,
    },
    ports::{
        source_file_repository::SourceFileError, vector_store::VectorStoreError, RepositoryError,
    },
};

pub mod handler_document_chunked;
pub mod handler_document_deleted;
pub mod handler_document_graph_build;
pub mod handler_document_reprocess;
pub mod handler_document_uploaded;
pub mod handler_embeddings_generate;
pub mod handler_graph_updated;
pub mod handler_query_prepare;
pub mod handler_status_updated;
pub mod handler_vector_index_updated;
pub mod handler_workspace_provision;

/// Decodes the payload of a consumed message
pub fn parse_event<E: EventPayload>(data: &[u8]) -> Result<E, HandlerError> {
    E::try_parsing(data).map_err(HandlerError::InvalidEvent)
}

#[derive(thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid event: {0}")]
    InvalidEvent(#[source] EventPayloadError),
    #[error("No handler for routing key {0}")]
    UnexpectedRoutingKey(String),
    #[error("{found} of the {expected} chunks of the event are stored")]
    MissingChunks { expected: usize, found: usize },
    #[error("Event asks for embeddings of model {requested}, the worker runs {configured}")]
    EmbeddingModelMismatch {
        requested: String,
        configured: String,
    },
    #[error(transparent)]
    RepositoryError(#[from] RepositoryError),
    #[error(transparent)]
    StatusServiceError(#[from] StatusServiceError),
    #[error(transparent)]
    PublishEventError(#[from] PublishEventError),
    #[error(transparent)]
    SourceFileError(#[from] SourceFileError),
    #[error(transparent)]
    IndexerError(#[from] IndexerError),
    #[error(transparent)]
    VectorStoreError(#[from] VectorStoreError),
    #[error(transparent)]
    QueryError(#[from] QueryError),
}

impl std::fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl HandlerError {
    /// Whether processing the same message again can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::InvalidEvent(_)
            | HandlerError::UnexpectedRoutingKey(_)
            | HandlerError::EmbeddingModelMismatch { .. }
            | HandlerError::QueryError(QueryError::BlankQuery | QueryError::InvalidTopK) => false,
            HandlerError::IndexerError(error) => !error.is_permanent(),
            HandlerError::VectorStoreError(error) => !error.is_permanent(),
            _ => true,
        }
    }
}

impl From<HandlerError> for ProcessingError {
    fn from(error: HandlerError) -> Self {
        if error.is_retryable() {
            ProcessingError::retryable(error)
        } else {
            ProcessingError::rejected(error)
        }
    }
}
