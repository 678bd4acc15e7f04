use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::dtos::status_events::WorkspaceStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::entities::workspace::Workspace,
    ports::{document_repository::WorkspaceRepository, RepositoryError},
};

/// Workspace repository implemented using Postgres
pub struct WorkspacePostgresRepository {
    pool: PgPool,
}

impl WorkspacePostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    status: String,
    status_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WorkspaceRow> for Workspace {
    type Error = RepositoryError;

    fn try_from(row: WorkspaceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            status: row.status.parse().map_err(RepositoryError::InvalidData)?,
            status_message: row.status_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl WorkspaceRepository for WorkspacePostgresRepository {
    #[tracing::instrument(name = "Getting workspace from database", skip(self))]
    async fn get(&self, workspace_id: Uuid) -> Result<Option<Workspace>, RepositoryError> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            r#"
    SELECT id, user_id, name, status, status_message, created_at, updated_at
    FROM workspaces WHERE id = $1
            "#,
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workspace::try_from).transpose()
    }

    #[tracing::instrument(name = "Saving new workspace in database", skip(self, workspace), fields(workspace_id = %workspace.id))]
    async fn insert_if_missing(&self, workspace: &Workspace) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO workspaces (id, user_id, name, status, status_message, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(workspace.id)
        .bind(workspace.user_id)
        .bind(&workspace.name)
        .bind(workspace.status.as_str())
        .bind(&workspace.status_message)
        .bind(workspace.created_at)
        .bind(workspace.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Updating workspace status in database", skip(self, message))]
    async fn update_status(
        &self,
        workspace_id: Uuid,
        expected_status: WorkspaceStatus,
        status: WorkspaceStatus,
        message: Option<&str>,
    ) -> Result<Option<Workspace>, RepositoryError> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            r#"
    UPDATE workspaces
    SET status = $3, status_message = $4, updated_at = $5
    WHERE id = $1 AND status = $2
    RETURNING id, user_id, name, status, status_message, created_at, updated_at
            "#,
        )
        .bind(workspace_id)
        .bind(expected_status.as_str())
        .bind(status.as_str())
        .bind(message)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workspace::try_from).transpose()
    }
}
