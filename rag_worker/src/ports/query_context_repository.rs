use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::entities::query_context::QueryContext;

#[async_trait]
pub trait QueryContextRepository: Send + Sync {
    /// Inserts or replaces the context stored under its key
    async fn save(&self, context: &QueryContext) -> Result<(), RepositoryError>;

    async fn get(&self, context_key: &str) -> Result<Option<QueryContext>, RepositoryError>;
}
