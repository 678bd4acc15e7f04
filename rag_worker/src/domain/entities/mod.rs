pub mod chunk;
pub mod content_point;
pub mod document;
pub mod graph;
pub mod parsed_document;
pub mod query_context;
pub mod retrieval_result;
pub mod workspace;
