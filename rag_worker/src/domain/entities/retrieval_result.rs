use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content_point::{ContentPointPayload, ScoredContentPoint};

/// Where a retrieved piece of context comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceModality {
    Text,
    Graph,
}

/// One ranked match of a query
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrievalResult {
    pub id: Uuid,
    pub score: f32,
    pub modality: SourceModality,
    pub payload: ContentPointPayload,
}

impl From<ScoredContentPoint> for RetrievalResult {
    fn from(point: ScoredContentPoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            modality: SourceModality::Text,
            payload: point.payload,
        }
    }
}
