use std::sync::Arc;

use common::helper::error_chain_fmt;
use tracing::info;

use super::{
    chunker::Chunker,
    embedding_encoder::{EmbeddingEncoder, EmbeddingError},
    parser::{Parser, ParsingError},
};
use crate::{
    domain::entities::{
        chunk::Chunk,
        parsed_document::{ParsedDocument, SourceMetadata},
    },
    ports::vector_store::{VectorStore, VectorStoreError},
};

/// Ingests documents: parse, chunk, embed then upsert in the vector store
///
/// The pipeline stages run the steps separately (`prepare` then `embed_and_store`),
/// `index` runs them all at once.
#[derive(Clone)]
pub struct Indexer {
    parser: Arc<dyn Parser>,
    chunker: Arc<dyn Chunker>,
    encoder: Arc<dyn EmbeddingEncoder>,
    vector_store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(
        parser: Arc<dyn Parser>,
        chunker: Arc<dyn Chunker>,
        encoder: Arc<dyn EmbeddingEncoder>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            parser,
            chunker,
            encoder,
            vector_store,
        }
    }

    pub fn encoder(&self) -> &Arc<dyn EmbeddingEncoder> {
        &self.encoder
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Parses and chunks a source file
    #[tracing::instrument(name = "Preparing document", skip(self, raw))]
    pub fn prepare(
        &self,
        raw: &[u8],
        source: &SourceMetadata,
    ) -> Result<(ParsedDocument, Vec<Chunk>), IndexerError> {
        let mut document = self.parser.parse(raw, source)?;
        let chunks = self.chunker.chunk(&document);
        document.chunk_count = Some(chunks.len());

        info!(
            "Split document into {} chunks with the {} chunker",
            chunks.len(),
            self.chunker.name()
        );
        Ok((document, chunks))
    }

    /// Embeds chunks and upserts their vectors, returns the chunks with their embedding
    #[tracing::instrument(name = "Embedding and storing chunks", skip(self, chunks), fields(count = chunks.len()))]
    pub async fn embed_and_store(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, IndexerError> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.encoder.encode(&texts).await?;

        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Chunk {
                embedding: Some(embedding),
                ..chunk
            })
            .collect();

        let points = chunks.iter().filter_map(Chunk::to_content_point).collect();
        self.vector_store.add(points).await?;

        info!(
            "Stored {} vectors in collection {}",
            chunks.len(),
            self.vector_store.collection_name()
        );
        Ok(chunks)
    }

    /// Parses, chunks, embeds and stores a source file in one go
    #[tracing::instrument(name = "Indexing document", skip(self, raw))]
    pub async fn index(
        &self,
        raw: &[u8],
        source: &SourceMetadata,
    ) -> Result<ParsedDocument, IndexerError> {
        let (document, chunks) = self.prepare(raw, source)?;
        self.embed_and_store(chunks).await?;

        Ok(document)
    }
}

#[derive(thiserror::Error)]
pub enum IndexerError {
    #[error(transparent)]
    ParsingError(#[from] ParsingError),
    #[error(transparent)]
    EmbeddingError(#[from] EmbeddingError),
    #[error(transparent)]
    VectorStoreError(#[from] VectorStoreError),
}

impl IndexerError {
    /// Whether indexing the same input again fails the same way
    pub fn is_permanent(&self) -> bool {
        match self {
            IndexerError::ParsingError(_) => true,
            IndexerError::EmbeddingError(error) => error.is_permanent(),
            IndexerError::VectorStoreError(error) => error.is_permanent(),
        }
    }
}

impl std::fmt::Debug for IndexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
