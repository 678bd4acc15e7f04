use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::dtos::status_events::DocumentProcessingStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::entities::document::{Document, DocumentStatusChange, Enrichment},
    ports::{document_repository::DocumentRepository, RepositoryError},
};

/// Document repository implemented using Postgres
pub struct DocumentPostgresRepository {
    pool: PgPool,
}

impl DocumentPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    workspace_id: Uuid,
    user_id: Uuid,
    filename: String,
    storage_path: String,
    content_hash: Option<String>,
    processing_status: String,
    error: Option<String>,
    chunk_count: Option<i32>,
    keywords: Vec<String>,
    summary: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let chunk_count = row
            .chunk_count
            .map(u32::try_from)
            .transpose()
            .map_err(|e| RepositoryError::InvalidData(format!("Invalid chunk count: {}", e)))?;

        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            user_id: row.user_id,
            filename: row.filename,
            storage_path: row.storage_path,
            content_hash: row.content_hash,
            processing_status: row
                .processing_status
                .parse()
                .map_err(RepositoryError::InvalidData)?,
            error: row.error,
            chunk_count,
            keywords: row.keywords,
            summary: row.summary,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const DOCUMENT_COLUMNS: &str = "id, workspace_id, user_id, filename, storage_path, content_hash, \
    processing_status, error, chunk_count, keywords, summary, created_at, updated_at";

#[async_trait]
impl DocumentRepository for DocumentPostgresRepository {
    #[tracing::instrument(name = "Getting document from database", skip(self))]
    async fn get(&self, document_id: Uuid) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    #[tracing::instrument(name = "Saving document in database", skip(self, document), fields(document_id = %document.id))]
    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO documents (id, workspace_id, user_id, filename, storage_path, content_hash,
        processing_status, error, chunk_count, keywords, summary, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (id) DO UPDATE SET
        workspace_id = EXCLUDED.workspace_id,
        user_id = EXCLUDED.user_id,
        filename = EXCLUDED.filename,
        storage_path = EXCLUDED.storage_path,
        content_hash = EXCLUDED.content_hash,
        processing_status = EXCLUDED.processing_status,
        error = EXCLUDED.error,
        chunk_count = EXCLUDED.chunk_count,
        keywords = EXCLUDED.keywords,
        summary = EXCLUDED.summary,
        updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(document.id)
        .bind(document.workspace_id)
        .bind(document.user_id)
        .bind(&document.filename)
        .bind(&document.storage_path)
        .bind(&document.content_hash)
        .bind(document.processing_status.as_str())
        .bind(&document.error)
        .bind(document.chunk_count.map(|count| count as i32))
        .bind(&document.keywords)
        .bind(&document.summary)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Updating document status in database", skip(self, change))]
    async fn update_status(
        &self,
        document_id: Uuid,
        expected_status: DocumentProcessingStatus,
        change: &DocumentStatusChange,
    ) -> Result<Option<Document>, RepositoryError> {
        // Compare-and-set on the status read by the caller
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
    UPDATE documents
    SET processing_status = $3, error = $4, chunk_count = $5, updated_at = $6
    WHERE id = $1 AND processing_status = $2
    RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .bind(expected_status.as_str())
        .bind(change.status.as_str())
        .bind(&change.error)
        .bind(change.chunk_count.map(|count| count as i32))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    #[tracing::instrument(name = "Saving document content hash in database", skip(self))]
    async fn set_content_hash(
        &self,
        document_id: Uuid,
        content_hash: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE documents SET content_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(document_id)
        .bind(content_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Saving document enrichment in database", skip(self, enrichment))]
    async fn set_enrichment(
        &self,
        document_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE documents SET keywords = $2, summary = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(document_id)
        .bind(&enrichment.keywords)
        .bind(&enrichment.summary)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Deleting document from database", skip(self))]
    async fn delete(&self, document_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
