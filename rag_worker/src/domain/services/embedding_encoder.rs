use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::helper::error_chain_fmt;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::helpers::{fnv1a_64, tokenize};
use crate::{
    configuration::{EmbeddingKind, EmbeddingSettings},
    domain::entities::content_point::Embeddings,
};

/// Turns texts into vectors of a fixed dimension
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per text, in order. Fails as a whole if any text fails.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Embeddings>, EmbeddingError>;

    async fn encode_one(&self, text: &str) -> Result<Embeddings, EmbeddingError> {
        let mut embeddings = self.encode(&[text.to_string()]).await?;

        embeddings.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

pub fn build_embedding_encoder(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingEncoder>, EmbeddingError> {
    let encoder: Arc<dyn EmbeddingEncoder> = match settings.kind {
        EmbeddingKind::Http => Arc::new(HttpEmbeddingEncoder::try_new(settings)?),
        EmbeddingKind::Hashing => Arc::new(HashingEmbeddingEncoder::new(
            &settings.model,
            settings.dimension,
        )),
    };

    Ok(encoder)
}

fn check_dimensions(
    embeddings: &[Embeddings],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: embeddings.len(),
        });
    }

    match embeddings.iter().find(|vector| vector.len() != dimension) {
        Some(vector) => Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        }),
        None => Ok(()),
    }
}

/// Client of an OpenAI compatible `/embeddings` endpoint
pub struct HttpEmbeddingEncoder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<Secret<String>>,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Embeddings,
}

impl HttpEmbeddingEncoder {
    pub fn try_new(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.endpoint.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            dimension: settings.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingEncoder for HttpEmbeddingEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    #[tracing::instrument(name = "Encoding texts with the embedding API", skip(self, texts), fields(count = texts.len()))]
    async fn encode(&self, texts: &[String]) -> Result<Vec<Embeddings>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut response: EmbeddingResponse = response.json().await?;
        // Not guaranteed to come in input order
        response.data.sort_by_key(|data| data.index);
        let embeddings: Vec<Embeddings> = response
            .data
            .into_iter()
            .map(|data| data.embedding)
            .collect();

        check_dimensions(&embeddings, texts.len(), self.dimension)?;
        info!("Encoded {} texts", embeddings.len());

        Ok(embeddings)
    }
}

/// Deterministic bag of words encoder: identical texts give identical vectors
///
/// Each word is hashed to a signed bucket, the vector is then normalized.
/// Meant for development and tests, it has no semantic knowledge.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingEncoder {
    model: String,
    dimension: usize,
}

impl HashingEmbeddingEncoder {
    pub fn new(model: &str, dimension: usize) -> Self {
        Self {
            model: model.to_string(),
            dimension: dimension.max(1),
        }
    }

    fn encode_text(&self, text: &str) -> Embeddings {
        let mut vector = vec![0f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|value| *value /= norm);
        }

        vector
    }
}

#[async_trait]
impl EmbeddingEncoder for HashingEmbeddingEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Embeddings>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.encode_text(text)).collect())
    }
}

#[derive(thiserror::Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
    #[error("Embedding backend answered with status {status}: {body}")]
    BackendStatus { status: u16, body: String },
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Expected embeddings of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Vectors of the wrong dimension come from a misconfigured model, retrying does not help
    pub fn is_permanent(&self) -> bool {
        matches!(self, EmbeddingError::DimensionMismatch { .. })
    }
}

impl std::fmt::Debug for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
