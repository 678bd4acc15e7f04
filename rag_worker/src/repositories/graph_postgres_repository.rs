use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::entities::graph::{GraphEdge, GraphNode, NodeKind, MENTIONED_IN_RELATION},
    ports::{graph_store::GraphStore, RepositoryError},
};

/// Knowledge graph stored in two Postgres tables: nodes and edges
pub struct GraphPostgresRepository {
    pool: PgPool,
}

impl GraphPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for GraphPostgresRepository {
    #[tracing::instrument(
        name = "Upserting graph in database",
        skip(self, nodes, edges),
        fields(nodes = nodes.len(), edges = edges.len())
    )]
    async fn upsert(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<(), RepositoryError> {
        let mut transaction = self.pool.begin().await?;

        for node in nodes {
            sqlx::query(
                r#"
    INSERT INTO graph_nodes (id, workspace_id, kind, label)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label
                "#,
            )
            .bind(node.id)
            .bind(node.workspace_id)
            .bind(node.kind.as_str())
            .bind(&node.label)
            .execute(&mut transaction)
            .await?;
        }

        for edge in edges {
            sqlx::query(
                r#"
    INSERT INTO graph_edges (source, target, relation, document_id, workspace_id)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (source, target, relation, document_id) DO NOTHING
                "#,
            )
            .bind(edge.source)
            .bind(edge.target)
            .bind(&edge.relation)
            .bind(edge.document_id)
            .bind(edge.workspace_id)
            .execute(&mut transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Deleting document graph from database", skip(self))]
    async fn delete_document(&self, document_id: Uuid) -> Result<(), RepositoryError> {
        let mut transaction = self.pool.begin().await?;

        let sources: Vec<(Uuid,)> =
            sqlx::query_as("DELETE FROM graph_edges WHERE document_id = $1 RETURNING source")
                .bind(document_id)
                .fetch_all(&mut transaction)
                .await?;
        let sources: Vec<Uuid> = sources.into_iter().map(|(source,)| source).collect();

        sqlx::query("DELETE FROM graph_nodes WHERE id = $1")
            .bind(document_id)
            .execute(&mut transaction)
            .await?;

        // Entities only found in this document
        sqlx::query(
            r#"
    DELETE FROM graph_nodes n
    WHERE n.id = ANY($1) AND n.kind = $2
    AND NOT EXISTS (SELECT 1 FROM graph_edges e WHERE e.source = n.id OR e.target = n.id)
            "#,
        )
        .bind(&sources)
        .bind(NodeKind::Entity.as_str())
        .execute(&mut transaction)
        .await?;

        transaction.commit().await?;
        Ok(())
    }

    #[tracing::instrument(name = "Getting related entities from database", skip(self))]
    async fn related_entities(
        &self,
        workspace_id: Uuid,
        labels: &[String],
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let entity_ids: Vec<Uuid> = labels
            .iter()
            .map(|label| GraphNode::entity_id(workspace_id, label))
            .collect();

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
    SELECT n.label, COUNT(*) AS mentions
    FROM graph_edges seed
    JOIN graph_edges other
        ON other.target = seed.target AND other.relation = $3 AND other.workspace_id = $1
    JOIN graph_nodes n ON n.id = other.source
    WHERE seed.workspace_id = $1 AND seed.relation = $3
        AND seed.source = ANY($2) AND NOT (other.source = ANY($2))
    GROUP BY n.label
    ORDER BY mentions DESC, n.label
    LIMIT $4
            "#,
        )
        .bind(workspace_id)
        .bind(&entity_ids)
        .bind(MENTIONED_IN_RELATION)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(label, _)| label).collect())
    }
}
