use async_trait::async_trait;
use common::helper::error_chain_fmt;

/// Read access to the stored source files
#[async_trait]
pub trait SourceFileRepository: Send + Sync {
    /// Content of the file at `storage_path`, `None` if there is no such file
    async fn read(&self, storage_path: &str) -> Result<Option<Vec<u8>>, SourceFileError>;
}

#[derive(thiserror::Error)]
pub enum SourceFileError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

impl std::fmt::Debug for SourceFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
