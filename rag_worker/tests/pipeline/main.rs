mod document_ingestion;
mod document_lifecycle;
mod embedding_stage;
mod helpers;
mod query_preparation;
mod status_broadcast;
mod workspace_provision;
