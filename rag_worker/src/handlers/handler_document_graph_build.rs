use std::sync::Arc;

use async_trait::async_trait;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        event_payload::publish_event,
        graph_events::{DocumentGraphBuildDto, ExtractedEntityDto, GraphUpdatedDto},
    },
};
use tracing::info;
use uuid::Uuid;

use super::{parse_event, HandlerError};
use crate::{
    domain::entities::graph::{
        GraphEdge, GraphNode, CO_OCCURS_WITH_RELATION, MENTIONED_IN_RELATION,
    },
    ports::{document_repository::DocumentRepository, graph_store::GraphStore},
};

/// Graph stage: upserts the document, its entities and their relations
pub struct DocumentGraphBuildHandler {
    documents: Arc<dyn DocumentRepository>,
    graph: Arc<dyn GraphStore>,
    publisher: Arc<dyn MessagePublisher>,
}

impl DocumentGraphBuildHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        graph: Arc<dyn GraphStore>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            documents,
            graph,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on document graph build",
        skip(self, event),
        fields(document_id = %event.document_id, entities = event.entities.len())
    )]
    pub async fn execute_handler(&self, event: &DocumentGraphBuildDto) -> Result<(), HandlerError> {
        let document = match self.documents.get(event.document_id).await? {
            Some(document) => document,
            None => {
                info!("Document was deleted, skipping graph construction");
                return Ok(());
            }
        };

        let (nodes, edges) = build_document_graph(
            event.workspace_id,
            event.document_id,
            &document.filename,
            &event.entities,
        );
        self.graph.upsert(&nodes, &edges).await?;

        publish_event(
            self.publisher.as_ref(),
            &GraphUpdatedDto {
                document_id: event.document_id,
                workspace_id: event.workspace_id,
                node_count: nodes.len(),
                edge_count: edges.len(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!(
            "Upserted {} nodes and {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(())
    }
}

/// Nodes and edges of one document
///
/// Each entity is `MENTIONED_IN` the document. Two entities mentioned in the same chunk
/// `CO_OCCURS_WITH` each other, from the smaller id to the greater one.
pub fn build_document_graph(
    workspace_id: Uuid,
    document_id: Uuid,
    filename: &str,
    entities: &[ExtractedEntityDto],
) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let edge = |source: Uuid, target: Uuid, relation: &str| GraphEdge {
        source,
        target,
        relation: relation.to_string(),
        document_id,
        workspace_id,
    };

    let mut nodes = vec![GraphNode::document(workspace_id, document_id, filename)];
    let mut edges = vec![];

    for entity in entities {
        let node = GraphNode::entity(workspace_id, &entity.name);
        if nodes.iter().any(|existing| existing.id == node.id) {
            continue;
        }
        edges.push(edge(node.id, document_id, MENTIONED_IN_RELATION));
        nodes.push(node);
    }

    for (index, first) in entities.iter().enumerate() {
        for second in &entities[index + 1..] {
            let shares_a_chunk = first
                .chunk_ids
                .iter()
                .any(|chunk_id| second.chunk_ids.contains(chunk_id));
            if !shares_a_chunk {
                continue;
            }

            let first_id = GraphNode::entity_id(workspace_id, &first.name);
            let second_id = GraphNode::entity_id(workspace_id, &second.name);
            if first_id == second_id {
                continue;
            }
            let co_occurrence = edge(
                first_id.min(second_id),
                first_id.max(second_id),
                CO_OCCURS_WITH_RELATION,
            );
            if !edges.contains(&co_occurrence) {
                edges.push(co_occurrence);
            }
        }
    }

    (nodes, edges)
}

#[async_trait]
impl MessageProcessor for DocumentGraphBuildHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<DocumentGraphBuildDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
