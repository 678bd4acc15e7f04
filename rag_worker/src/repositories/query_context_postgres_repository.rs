use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use crate::{
    domain::entities::query_context::QueryContext,
    ports::{query_context_repository::QueryContextRepository, RepositoryError},
};

/// Query contexts stored as JSON documents, keyed by their context key
pub struct QueryContextPostgresRepository {
    pool: PgPool,
}

impl QueryContextPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryContextRepository for QueryContextPostgresRepository {
    #[tracing::instrument(name = "Saving query context in database", skip(self, context), fields(context_key = %context.context_key))]
    async fn save(&self, context: &QueryContext) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO query_contexts (context_key, query_id, workspace_id, context, created_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (context_key) DO UPDATE SET context = EXCLUDED.context
            "#,
        )
        .bind(&context.context_key)
        .bind(context.query_id)
        .bind(context.workspace_id)
        .bind(Json(context))
        .bind(context.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Getting query context from database", skip(self))]
    async fn get(&self, context_key: &str) -> Result<Option<QueryContext>, RepositoryError> {
        let row: Option<(Json<QueryContext>,)> =
            sqlx::query_as("SELECT context FROM query_contexts WHERE context_key = $1")
                .bind(context_key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(context),)| context))
    }
}
