use chrono::{DateTime, Utc};
use common::dtos::query_events::RagType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retrieval_result::RetrievalResult;

/// Retrieval context prepared for a queued query, read back by the front door
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryContext {
    pub context_key: String,
    pub query_id: Uuid,
    pub workspace_id: Uuid,
    pub query_text: String,
    pub rag_type: RagType,
    pub results: Vec<RetrievalResult>,
    /// Labels of the graph entities related to the query, for graph queries
    pub related_entities: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl QueryContext {
    pub fn key_for(query_id: Uuid) -> String {
        format!("query_context:{}", query_id)
    }

    /// Context text handed to the generation model, most relevant first
    pub fn assembled_text(&self) -> String {
        let mut sections: Vec<String> = self
            .results
            .iter()
            .map(|result| result.payload.content.clone())
            .collect();

        if !self.related_entities.is_empty() {
            sections.push(format!(
                "Related entities: {}",
                self.related_entities.join(", ")
            ));
        }

        sections.join("\n\n")
    }
}
