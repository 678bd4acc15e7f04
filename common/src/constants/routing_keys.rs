//! Routing keys of every event exchanged on the content topic exchange.

pub const DOCUMENT_UPLOADED_ROUTING_KEY: &str = "document.uploaded";
pub const DOCUMENT_CHUNKED_ROUTING_KEY: &str = "document.chunked";
pub const EMBEDDINGS_GENERATE_ROUTING_KEY: &str = "embeddings.generate";
pub const VECTOR_INDEX_UPDATED_ROUTING_KEY: &str = "vector.index.updated";
pub const DOCUMENT_GRAPH_BUILD_ROUTING_KEY: &str = "document.graph_build";
pub const GRAPH_UPDATED_ROUTING_KEY: &str = "graph.updated";
pub const DOCUMENT_ENRICHED_ROUTING_KEY: &str = "document.enriched";
pub const DOCUMENT_DELETED_ROUTING_KEY: &str = "document.deleted";
pub const DOCUMENT_REPROCESS_ROUTING_KEY: &str = "document.reprocess";
pub const DOCUMENT_STATUS_UPDATED_ROUTING_KEY: &str = "document.status.updated";

pub const WORKSPACE_PROVISION_ROUTING_KEY: &str = "workspace.provision";
pub const WORKSPACE_STATUS_UPDATED_ROUTING_KEY: &str = "workspace.status.updated";

pub const QUERY_PREPARE_ROUTING_KEY: &str = "query.prepare";
pub const QUERY_READY_ROUTING_KEY: &str = "query.ready";

/// Binding pattern matching both document and workspace status events
pub const STATUS_UPDATED_BINDING_KEY: &str = "*.status.updated";

/// Message header counting how many times a message was retried by a worker
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Message header keeping the exchange routing key of a message sent straight to a queue
pub const ORIGINAL_ROUTING_KEY_HEADER: &str = "x-original-routing-key";

/// Suffix of the queue receiving the messages a worker gave up on
pub const DEAD_LETTER_QUEUE_SUFFIX: &str = "dead_letter";
