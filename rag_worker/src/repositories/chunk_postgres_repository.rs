use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::entities::{
        chunk::{Chunk, ChunkMetadata},
        content_point::Embeddings,
    },
    ports::{chunk_repository::ChunkRepository, RepositoryError},
};

/// Chunk repository implemented using Postgres
pub struct ChunkPostgresRepository {
    pool: PgPool,
}

impl ChunkPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    document_id: Uuid,
    workspace_id: Uuid,
    ordinal: i32,
    text: String,
    start_offset: i64,
    end_offset: i64,
    chunker: String,
    embedding: Option<Vec<f32>>,
}

impl TryFrom<ChunkRow> for Chunk {
    type Error = RepositoryError;

    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str| RepositoryError::InvalidData(format!("Invalid chunk {}", field));

        Ok(Self {
            id: row.id,
            document_id: row.document_id,
            workspace_id: row.workspace_id,
            ordinal: u32::try_from(row.ordinal).map_err(|_| invalid("ordinal"))?,
            text: row.text,
            metadata: ChunkMetadata {
                start_offset: usize::try_from(row.start_offset)
                    .map_err(|_| invalid("start offset"))?,
                end_offset: usize::try_from(row.end_offset).map_err(|_| invalid("end offset"))?,
                chunker: row.chunker,
            },
            embedding: row.embedding,
        })
    }
}

fn to_chunks(rows: Vec<ChunkRow>) -> Result<Vec<Chunk>, RepositoryError> {
    rows.into_iter().map(Chunk::try_from).collect()
}

#[async_trait]
impl ChunkRepository for ChunkPostgresRepository {
    #[tracing::instrument(name = "Saving chunks in database", skip(self, chunks), fields(count = chunks.len()))]
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<(), RepositoryError> {
        let mut transaction = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
    INSERT INTO chunks (id, document_id, workspace_id, ordinal, text, start_offset, end_offset, chunker, embedding)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (id) DO UPDATE SET
        text = EXCLUDED.text,
        start_offset = EXCLUDED.start_offset,
        end_offset = EXCLUDED.end_offset,
        chunker = EXCLUDED.chunker,
        embedding = EXCLUDED.embedding
                "#,
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.workspace_id)
            .bind(chunk.ordinal as i32)
            .bind(&chunk.text)
            .bind(chunk.metadata.start_offset as i64)
            .bind(chunk.metadata.end_offset as i64)
            .bind(&chunk.metadata.chunker)
            .bind(&chunk.embedding)
            .execute(&mut transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Getting chunks from database", skip(self, chunk_ids), fields(count = chunk_ids.len()))]
    async fn get_chunks(&self, chunk_ids: &[Uuid]) -> Result<Vec<Chunk>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
    SELECT id, document_id, workspace_id, ordinal, text, start_offset, end_offset, chunker, embedding
    FROM chunks WHERE id = ANY($1)
    ORDER BY ordinal
            "#,
        )
        .bind(chunk_ids)
        .fetch_all(&self.pool)
        .await?;

        to_chunks(rows)
    }

    #[tracing::instrument(name = "Getting document chunks from database", skip(self))]
    async fn get_document_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
    SELECT id, document_id, workspace_id, ordinal, text, start_offset, end_offset, chunker, embedding
    FROM chunks WHERE document_id = $1
    ORDER BY ordinal
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        to_chunks(rows)
    }

    #[tracing::instrument(name = "Saving chunk embeddings in database", skip(self, embeddings), fields(count = embeddings.len()))]
    async fn set_embeddings(
        &self,
        embeddings: &[(Uuid, Embeddings)],
    ) -> Result<(), RepositoryError> {
        let mut transaction = self.pool.begin().await?;

        for (chunk_id, embedding) in embeddings {
            sqlx::query("UPDATE chunks SET embedding = $2 WHERE id = $1")
                .bind(chunk_id)
                .bind(embedding)
                .execute(&mut transaction)
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Deleting document chunks from database", skip(self))]
    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
