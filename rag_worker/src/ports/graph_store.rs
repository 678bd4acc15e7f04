use async_trait::async_trait;
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::entities::graph::{GraphEdge, GraphNode};

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upserts nodes keyed by id and edges keyed by (source, target, relation, document)
    async fn upsert(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<(), RepositoryError>;

    /// Removes the edges found in a document, its node, and the entities left without edges
    async fn delete_document(&self, document_id: Uuid) -> Result<(), RepositoryError>;

    /// Labels of the entities sharing a document with any of the entities `labels`, excluding them
    async fn related_entities(
        &self,
        workspace_id: Uuid,
        labels: &[String],
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError>;
}
