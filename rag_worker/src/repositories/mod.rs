pub mod chunk_postgres_repository;
pub mod content_point_in_memory_repository;
pub mod content_point_qdrant_repository;
pub mod document_postgres_repository;
pub mod graph_postgres_repository;
pub mod in_memory_repositories;
pub mod query_context_postgres_repository;
pub mod source_file_fs_repository;
pub mod source_file_in_memory_repository;
pub mod workspace_postgres_repository;
