use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::entities::content_point::{ContentPoint, ScoredContentPoint, SearchFilter},
    ports::vector_store::{VectorStore, VectorStoreError},
};

/// Vector store kept in memory, searched by cosine similarity
///
/// Points keep their insertion order, which breaks score ties.
pub struct InMemoryVectorStore {
    collection_name: String,
    dimension: usize,
    points: RwLock<Vec<ContentPoint>>,
}

impl InMemoryVectorStore {
    pub fn new(collection_name: &str, dimension: usize) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            dimension,
            points: RwLock::new(vec![]),
        }
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    pub async fn document_point_count(&self, document_id: Uuid) -> usize {
        self.points
            .read()
            .await
            .iter()
            .filter(|point| point.payload.document_id == document_id)
            .count()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorStoreError> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn add(&self, points: Vec<ContentPoint>) -> Result<(), VectorStoreError> {
        for point in &points {
            self.check_dimension(&point.vector)?;
        }

        let mut stored = self.points.write().await;
        for point in points {
            match stored.iter_mut().find(|stored| stored.id == point.id) {
                Some(stored) => *stored = point,
                None => stored.push(point),
            }
        }

        info!("In-memory collection holds {} points", stored.len());
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredContentPoint>, VectorStoreError> {
        self.check_dimension(vector)?;

        let mut matches: Vec<ScoredContentPoint> = self
            .points
            .read()
            .await
            .iter()
            .filter(|point| filter.map_or(true, |filter| filter.matches(&point.payload)))
            .map(|point| ScoredContentPoint {
                id: point.id,
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        // Stable sort: ties keep the scan order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<(), VectorStoreError> {
        self.points
            .write()
            .await
            .retain(|point| point.payload.document_id != document_id);
        Ok(())
    }
}
