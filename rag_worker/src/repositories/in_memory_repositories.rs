//! Relational store ports kept in process memory, for tests and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use common::dtos::status_events::{DocumentProcessingStatus, WorkspaceStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    domain::entities::{
        chunk::Chunk,
        content_point::Embeddings,
        document::{Document, DocumentStatusChange, Enrichment},
        graph::{GraphEdge, GraphNode, NodeKind, MENTIONED_IN_RELATION},
        query_context::QueryContext,
        workspace::Workspace,
    },
    ports::{
        chunk_repository::ChunkRepository,
        document_repository::{DocumentRepository, WorkspaceRepository},
        graph_store::GraphStore,
        query_context_repository::QueryContextRepository,
        RepositoryError,
    },
};

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<Uuid, Document>>,
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn get(&self, document_id: Uuid) -> Result<Option<Document>, RepositoryError> {
        Ok(self.documents.read().await.get(&document_id).cloned())
    }

    async fn save(&self, document: &Document) -> Result<(), RepositoryError> {
        self.documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        document_id: Uuid,
        expected_status: DocumentProcessingStatus,
        change: &DocumentStatusChange,
    ) -> Result<Option<Document>, RepositoryError> {
        let mut documents = self.documents.write().await;

        match documents.get_mut(&document_id) {
            Some(document) if document.processing_status == expected_status => {
                document.processing_status = change.status;
                document.error = change.error.clone();
                document.chunk_count = change.chunk_count;
                document.updated_at = Utc::now();
                Ok(Some(document.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_content_hash(
        &self,
        document_id: Uuid,
        content_hash: &str,
    ) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;

        Ok(match documents.get_mut(&document_id) {
            Some(document) => {
                document.content_hash = Some(content_hash.to_string());
                document.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_enrichment(
        &self,
        document_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;

        Ok(match documents.get_mut(&document_id) {
            Some(document) => {
                document.keywords = enrichment.keywords.clone();
                document.summary = Some(enrichment.summary.clone());
                document.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete(&self, document_id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.documents.write().await.remove(&document_id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryWorkspaceRepository {
    workspaces: RwLock<HashMap<Uuid, Workspace>>,
}

#[async_trait]
impl WorkspaceRepository for InMemoryWorkspaceRepository {
    async fn get(&self, workspace_id: Uuid) -> Result<Option<Workspace>, RepositoryError> {
        Ok(self.workspaces.read().await.get(&workspace_id).cloned())
    }

    async fn insert_if_missing(&self, workspace: &Workspace) -> Result<(), RepositoryError> {
        self.workspaces
            .write()
            .await
            .entry(workspace.id)
            .or_insert_with(|| workspace.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        workspace_id: Uuid,
        expected_status: WorkspaceStatus,
        status: WorkspaceStatus,
        message: Option<&str>,
    ) -> Result<Option<Workspace>, RepositoryError> {
        let mut workspaces = self.workspaces.write().await;

        match workspaces.get_mut(&workspace_id) {
            Some(workspace) if workspace.status == expected_status => {
                workspace.status = status;
                workspace.status_message = message.map(str::to_string);
                workspace.updated_at = Utc::now();
                Ok(Some(workspace.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct InMemoryChunkRepository {
    chunks: RwLock<HashMap<Uuid, Chunk>>,
}

fn by_ordinal(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by_key(|chunk| chunk.ordinal);
    chunks
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn save_chunks(&self, chunks: &[Chunk]) -> Result<(), RepositoryError> {
        let mut stored = self.chunks.write().await;
        for chunk in chunks {
            stored.insert(chunk.id, chunk.clone());
        }
        Ok(())
    }

    async fn get_chunks(&self, chunk_ids: &[Uuid]) -> Result<Vec<Chunk>, RepositoryError> {
        let stored = self.chunks.read().await;

        Ok(by_ordinal(
            chunk_ids
                .iter()
                .collect::<HashSet<_>>()
                .into_iter()
                .filter_map(|chunk_id| stored.get(chunk_id).cloned())
                .collect(),
        ))
    }

    async fn get_document_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>, RepositoryError> {
        Ok(by_ordinal(
            self.chunks
                .read()
                .await
                .values()
                .filter(|chunk| chunk.document_id == document_id)
                .cloned()
                .collect(),
        ))
    }

    async fn set_embeddings(
        &self,
        embeddings: &[(Uuid, Embeddings)],
    ) -> Result<(), RepositoryError> {
        let mut stored = self.chunks.write().await;
        for (chunk_id, embedding) in embeddings {
            if let Some(chunk) = stored.get_mut(chunk_id) {
                chunk.embedding = Some(embedding.clone());
            }
        }
        Ok(())
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<u64, RepositoryError> {
        let mut stored = self.chunks.write().await;
        let before = stored.len();
        stored.retain(|_, chunk| chunk.document_id != document_id);

        Ok((before - stored.len()) as u64)
    }
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<Uuid, GraphNode>,
    edges: HashSet<GraphEdge>,
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
}

impl InMemoryGraphStore {
    pub async fn node_count(&self) -> usize {
        self.graph.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.edges.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<(), RepositoryError> {
        let mut graph = self.graph.write().await;
        for node in nodes {
            graph.nodes.insert(node.id, node.clone());
        }
        graph.edges.extend(edges.iter().cloned());
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<(), RepositoryError> {
        let mut graph = self.graph.write().await;
        graph.edges.retain(|edge| edge.document_id != document_id);
        graph.nodes.remove(&document_id);

        let linked: HashSet<Uuid> = graph
            .edges
            .iter()
            .flat_map(|edge| [edge.source, edge.target])
            .collect();
        graph
            .nodes
            .retain(|id, node| node.kind != NodeKind::Entity || linked.contains(id));
        Ok(())
    }

    async fn related_entities(
        &self,
        workspace_id: Uuid,
        labels: &[String],
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let graph = self.graph.read().await;
        let entity_ids: HashSet<Uuid> = labels
            .iter()
            .map(|label| GraphNode::entity_id(workspace_id, label))
            .collect();

        let mentions = graph.edges.iter().filter(|edge| {
            edge.workspace_id == workspace_id && edge.relation == MENTIONED_IN_RELATION
        });
        let documents: HashSet<Uuid> = mentions
            .clone()
            .filter(|edge| entity_ids.contains(&edge.source))
            .map(|edge| edge.target)
            .collect();

        let mut related: HashMap<Uuid, usize> = HashMap::new();
        for edge in mentions {
            if documents.contains(&edge.target) && !entity_ids.contains(&edge.source) {
                *related.entry(edge.source).or_default() += 1;
            }
        }

        let mut related: Vec<(&GraphNode, usize)> = related
            .into_iter()
            .filter_map(|(id, count)| graph.nodes.get(&id).map(|node| (node, count)))
            .collect();
        related.sort_by(|(node_a, count_a), (node_b, count_b)| {
            count_b.cmp(count_a).then(node_a.label.cmp(&node_b.label))
        });

        Ok(related
            .into_iter()
            .take(limit)
            .map(|(node, _)| node.label.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryQueryContextRepository {
    contexts: RwLock<HashMap<String, QueryContext>>,
}

#[async_trait]
impl QueryContextRepository for InMemoryQueryContextRepository {
    async fn save(&self, context: &QueryContext) -> Result<(), RepositoryError> {
        self.contexts
            .write()
            .await
            .insert(context.context_key.clone(), context.clone());
        Ok(())
    }

    async fn get(&self, context_key: &str) -> Result<Option<QueryContext>, RepositoryError> {
        Ok(self.contexts.read().await.get(context_key).cloned())
    }
}
