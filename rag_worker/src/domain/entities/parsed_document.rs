use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Identity and context of a raw source file handed to a parser
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub filename: String,
    pub metadata: JsonValue,
}

impl SourceMetadata {
    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_lowercase())
    }
}

/// Text content extracted from a source file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParsedDocument {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub content: String,
    pub metadata: JsonValue,
    /// Set once the document is chunked
    pub chunk_count: Option<usize>,
}
