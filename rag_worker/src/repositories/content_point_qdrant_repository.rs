use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    prelude::{QdrantClient, QdrantClientConfig},
    qdrant::{
        self, point_id::PointIdOptions, points_selector::PointsSelectorOneOf, value::Kind,
        vectors_config::Config, Condition, CreateCollection, Distance, Filter, PointStruct,
        PointsSelector, ScoredPoint, SearchPoints, VectorParams, VectorsConfig,
    },
};
use tracing::info;
use uuid::Uuid;

use crate::{
    configuration::VectorStoreSettings,
    domain::entities::content_point::{
        ContentPoint, ContentPointPayload, ScoredContentPoint, SearchFilter,
    },
    ports::vector_store::{VectorStore, VectorStoreError},
};

/// Chunk vectors (content points) persisted in a Qdrant collection
pub struct ContentPointQdrantRepository {
    client: QdrantClient,
    collection_name: String,
    collection_distance: Distance,
    collection_vector_size: u64,
}

impl ContentPointQdrantRepository {
    /// Connects to Qdrant and creates the collection if needed
    #[tracing::instrument(
        name = "Initializing Qdrant and the associated collection",
        skip(client)
    )]
    pub async fn try_new(
        client: QdrantClient,
        collection_name: &str,
        collection_distance: &str,
        collection_vector_size: u64,
    ) -> Result<Self, VectorStoreError> {
        let collection_distance = Distance::from_str_name(collection_distance).ok_or(
            VectorStoreError::ConfigurationError(format!(
                "Invalid Qdrant distance: {}",
                collection_distance
            )),
        )?;

        let repository = Self {
            client,
            collection_name: collection_name.to_string(),
            collection_distance,
            collection_vector_size,
        };
        repository.ensure_collection().await?;

        Ok(repository)
    }

    pub async fn from_settings(settings: &VectorStoreSettings) -> Result<Self, VectorStoreError> {
        let client = get_qdrant_client(settings)?;

        Self::try_new(
            client,
            &settings.collection,
            &settings.collection_distance,
            settings.collection_vector_size,
        )
        .await
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorStoreError> {
        if vector.len() as u64 != self.collection_vector_size {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.collection_vector_size as usize,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Set up a client to Qdrant
pub fn get_qdrant_client(settings: &VectorStoreSettings) -> Result<QdrantClient, VectorStoreError> {
    let qdrant_config = QdrantClientConfig::from_url(&settings.get_grpc_base_url());
    QdrantClient::new(Some(qdrant_config))
        .map_err(|e| VectorStoreError::BackendError(e.to_string()))
}

#[async_trait]
impl VectorStore for ContentPointQdrantRepository {
    fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn dimension(&self) -> usize {
        self.collection_vector_size as usize
    }

    #[tracing::instrument(name = "Creating Qdrant collection", skip(self), fields(collection = %self.collection_name))]
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        // Not idempotent on Qdrant side
        let result = self
            .client
            .create_collection(&CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: self.collection_vector_size,
                        distance: self.collection_distance as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await;

        match result {
            Ok(_) => {
                info!("Created collection");
                Ok(())
            }
            // Qdrant client only returns anyhow errors for now
            Err(error) if error.to_string().contains("already exists") => Ok(()),
            Err(error) => Err(VectorStoreError::BackendError(error.to_string())),
        }
    }

    #[tracing::instrument(name = "Saving content points to Qdrant", skip(self, points), fields(count = points.len()))]
    async fn add(&self, points: Vec<ContentPoint>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }
        for point in &points {
            self.check_dimension(&point.vector)?;
        }

        self.client
            .upsert_points(
                &self.collection_name,
                points.into_iter().map(PointStruct::from).collect(),
                None,
            )
            .await
            .map_err(|e| VectorStoreError::BackendError(e.to_string()))?;

        info!("Saved content points");
        Ok(())
    }

    #[tracing::instrument(name = "Searching content points in Qdrant", skip(self, vector))]
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredContentPoint>, VectorStoreError> {
        self.check_dimension(vector)?;

        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection_name.clone(),
                vector: vector.to_vec(),
                filter: filter.and_then(Filter::from_search_filter),
                limit: top_k as u64,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorStoreError::BackendError(e.to_string()))?;

        response
            .result
            .into_iter()
            .map(ScoredContentPoint::try_from)
            .collect()
    }

    #[tracing::instrument(name = "Deleting document points from Qdrant", skip(self))]
    async fn delete_document(&self, document_id: Uuid) -> Result<(), VectorStoreError> {
        let selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Filter(Filter::must([
                Condition::matches(DOCUMENT_ID_FIELD, document_id.to_string()),
            ]))),
        };

        self.client
            .delete_points(&self.collection_name, &selector, None)
            .await
            .map_err(|e| VectorStoreError::BackendError(e.to_string()))?;

        Ok(())
    }
}

const DOCUMENT_ID_FIELD: &str = "document_id";
const WORKSPACE_ID_FIELD: &str = "workspace_id";
const ORDINAL_FIELD: &str = "ordinal";
const CONTENT_FIELD: &str = "content";

trait FromSearchFilter: Sized {
    fn from_search_filter(filter: &SearchFilter) -> Option<Self>;
}

impl FromSearchFilter for Filter {
    /// `None` when the filter does not restrict anything
    fn from_search_filter(filter: &SearchFilter) -> Option<Self> {
        let conditions: Vec<Condition> = [
            (WORKSPACE_ID_FIELD, filter.workspace_id),
            (DOCUMENT_ID_FIELD, filter.document_id),
        ]
        .into_iter()
        .filter_map(|(field, id)| id.map(|id| Condition::matches(field, id.to_string())))
        .collect();

        (!conditions.is_empty()).then(|| Filter::must(conditions))
    }
}

impl From<ContentPoint> for PointStruct {
    fn from(content_point: ContentPoint) -> Self {
        Self {
            id: Some(content_point.id.to_string().into()),
            vectors: Some(content_point.vector.into()),
            payload: content_point.payload.into(),
        }
    }
}

impl From<ContentPointPayload> for HashMap<String, qdrant::Value> {
    fn from(payload: ContentPointPayload) -> Self {
        HashMap::from([
            (
                DOCUMENT_ID_FIELD.into(),
                qdrant::Value::from(payload.document_id.to_string()),
            ),
            (
                WORKSPACE_ID_FIELD.into(),
                qdrant::Value::from(payload.workspace_id.to_string()),
            ),
            (
                ORDINAL_FIELD.into(),
                qdrant::Value::from(i64::from(payload.ordinal)),
            ),
            (CONTENT_FIELD.into(), qdrant::Value::from(payload.content)),
        ])
    }
}

fn string_field<'a>(
    payload: &'a HashMap<String, qdrant::Value>,
    field: &str,
) -> Result<&'a str, VectorStoreError> {
    match payload.get(field).and_then(|value| value.kind.as_ref()) {
        Some(Kind::StringValue(value)) => Ok(value),
        _ => Err(VectorStoreError::InvalidPoint(format!(
            "Missing string payload field {}",
            field
        ))),
    }
}

fn uuid_field(
    payload: &HashMap<String, qdrant::Value>,
    field: &str,
) -> Result<Uuid, VectorStoreError> {
    Uuid::parse_str(string_field(payload, field)?)
        .map_err(|e| VectorStoreError::InvalidPoint(format!("Invalid {}: {}", field, e)))
}

impl TryFrom<ScoredPoint> for ScoredContentPoint {
    type Error = VectorStoreError;

    fn try_from(point: ScoredPoint) -> Result<Self, Self::Error> {
        let id = match point.id.and_then(|id| id.point_id_options) {
            Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(&id)
                .map_err(|e| VectorStoreError::InvalidPoint(format!("Invalid point id: {}", e)))?,
            _ => {
                return Err(VectorStoreError::InvalidPoint(
                    "Point without uuid".to_string(),
                ))
            }
        };

        let ordinal = match point
            .payload
            .get(ORDINAL_FIELD)
            .and_then(|value| value.kind.as_ref())
        {
            Some(Kind::IntegerValue(ordinal)) => u32::try_from(*ordinal)
                .map_err(|e| VectorStoreError::InvalidPoint(format!("Invalid ordinal: {}", e)))?,
            _ => 0,
        };

        Ok(Self {
            id,
            score: point.score,
            payload: ContentPointPayload {
                document_id: uuid_field(&point.payload, DOCUMENT_ID_FIELD)?,
                workspace_id: uuid_field(&point.payload, WORKSPACE_ID_FIELD)?,
                ordinal,
                content: string_field(&point.payload, CONTENT_FIELD)?.to_string(),
            },
        })
    }
}
