use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    core::{
        message_broker::MessagePublisher,
        message_worker::{MessageProcessor, ProcessingError},
    },
    dtos::{
        event_payload::publish_event,
        query_events::{QueryPrepareDto, QueryReadyDto, RagType},
    },
};
use tracing::info;

use super::{parse_event, HandlerError};
use crate::{
    domain::{
        entities::{content_point::SearchFilter, query_context::QueryContext},
        services::{
            entity_extractor::EntityExtractor,
            query::{QueryError, QueryService},
        },
    },
    ports::{graph_store::GraphStore, query_context_repository::QueryContextRepository},
};

/// Related graph entities added to the context of a graph query
const RELATED_ENTITIES_LIMIT: usize = 10;

/// Query stage: retrieves the context of a query and stores it for the front door
pub struct QueryPrepareHandler {
    query_service: Arc<QueryService>,
    extractor: Arc<dyn EntityExtractor>,
    graph: Arc<dyn GraphStore>,
    query_contexts: Arc<dyn QueryContextRepository>,
    publisher: Arc<dyn MessagePublisher>,
}

impl QueryPrepareHandler {
    pub fn new(
        query_service: Arc<QueryService>,
        extractor: Arc<dyn EntityExtractor>,
        graph: Arc<dyn GraphStore>,
        query_contexts: Arc<dyn QueryContextRepository>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            query_service,
            extractor,
            graph,
            query_contexts,
            publisher,
        }
    }

    #[tracing::instrument(
        name = "Executing handler on query preparation",
        skip(self, event),
        fields(query_id = %event.query_id, rag_type = ?event.rag_type, top_k = event.top_k)
    )]
    pub async fn execute_handler(&self, event: &QueryPrepareDto) -> Result<(), HandlerError> {
        let filter = SearchFilter::workspace(event.workspace_id);
        let results = match self
            .query_service
            .query(&event.query_text, event.top_k, Some(&filter))
            .await
        {
            Ok(results) => results,
            Err(QueryError::NoResults) => {
                info!("Nothing matches the query in the workspace");
                vec![]
            }
            Err(error) => return Err(error.into()),
        };

        let related_entities = match event.rag_type {
            RagType::Vector => vec![],
            RagType::Graph => {
                let labels = self.extractor.extract_labels(&event.query_text);
                self.graph
                    .related_entities(event.workspace_id, &labels, RELATED_ENTITIES_LIMIT)
                    .await?
            }
        };

        let context = QueryContext {
            context_key: QueryContext::key_for(event.query_id),
            query_id: event.query_id,
            workspace_id: event.workspace_id,
            query_text: event.query_text.clone(),
            rag_type: event.rag_type,
            results,
            related_entities,
            created_at: Utc::now(),
        };
        self.query_contexts.save(&context).await?;

        publish_event(
            self.publisher.as_ref(),
            &QueryReadyDto {
                query_id: event.query_id,
                workspace_id: event.workspace_id,
                context_key: context.context_key.clone(),
                chunk_count: context.results.len(),
                metadata: event.metadata.clone(),
            },
        )
        .await?;

        info!(
            "Prepared query context with {} chunks and {} related entities",
            context.results.len(),
            context.related_entities.len()
        );
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for QueryPrepareHandler {
    async fn process_event(&self, _routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        let event = parse_event::<QueryPrepareDto>(data)?;

        Ok(self.execute_handler(&event).await?)
    }
}
