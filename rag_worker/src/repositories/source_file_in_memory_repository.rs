use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::source_file_repository::{SourceFileError, SourceFileRepository};

/// Source files kept in memory, keyed by storage path
#[derive(Default)]
pub struct SourceFileInMemoryRepository {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl SourceFileInMemoryRepository {
    pub async fn put(&self, storage_path: &str, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .await
            .insert(storage_path.to_string(), content.into());
    }

    pub async fn remove(&self, storage_path: &str) -> bool {
        self.files.write().await.remove(storage_path).is_some()
    }
}

#[async_trait]
impl SourceFileRepository for SourceFileInMemoryRepository {
    async fn read(&self, storage_path: &str) -> Result<Option<Vec<u8>>, SourceFileError> {
        Ok(self.files.read().await.get(storage_path).cloned())
    }
}
