use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::ports::source_file_repository::{SourceFileError, SourceFileRepository};

/// Source files read from a local directory
///
/// Storage paths are relative to the base directory and can not leave it.
pub struct SourceFileFsRepository {
    base_path: PathBuf,
}

impl SourceFileFsRepository {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf, SourceFileError> {
        let path = Path::new(storage_path);
        let is_contained = path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if storage_path.is_empty() || !is_contained {
            return Err(SourceFileError::InvalidPath(storage_path.to_string()));
        }

        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl SourceFileRepository for SourceFileFsRepository {
    #[tracing::instrument(name = "Reading source file", skip(self))]
    async fn read(&self, storage_path: &str) -> Result<Option<Vec<u8>>, SourceFileError> {
        let path = self.resolve(storage_path)?;

        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
