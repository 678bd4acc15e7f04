pub mod chunker;
pub mod embedding_encoder;
pub mod enricher;
pub mod entity_extractor;
pub mod helpers;
pub mod indexer;
pub mod parser;
pub mod query;
pub mod status_broadcaster;
pub mod status_service;
