use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{
    core::{
        event_router::{EventRouter, EventRouterError},
        in_memory_message_broker::InMemoryMessageBroker,
        message_broker::{MessageBroker, MessageBrokerError, MessagePublisher},
        message_worker::{MessageProcessor, MessageWorker, RetryPolicy, WorkerSettings},
        rabbitmq_message_repository::RabbitMQMessageRepository,
    },
    helper::error_chain_fmt,
};
use futures::future::join_all;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    configuration::{
        RabbitMQSettings, RepositoryKind, Settings, Stage, VectorStoreKind, VectorStoreSettings,
    },
    domain::services::{
        chunker::{build_chunker, Chunker, ChunkerError},
        embedding_encoder::{build_embedding_encoder, EmbeddingEncoder, EmbeddingError},
        enricher::{Enricher, KeywordEnricher},
        entity_extractor::{CapitalizedPhraseExtractor, EntityExtractor},
        indexer::Indexer,
        parser::{Parser, SourceParser},
        query::QueryService,
        status_broadcaster::StatusBroadcaster,
        status_service::StatusService,
    },
    handlers::{
        handler_document_chunked::DocumentChunkedHandler,
        handler_document_deleted::DocumentDeletedHandler,
        handler_document_graph_build::DocumentGraphBuildHandler,
        handler_document_reprocess::DocumentReprocessHandler,
        handler_document_uploaded::DocumentUploadedHandler,
        handler_embeddings_generate::EmbeddingsGenerateHandler,
        handler_graph_updated::GraphUpdatedHandler,
        handler_query_prepare::QueryPrepareHandler,
        handler_status_updated::StatusUpdatedHandler,
        handler_vector_index_updated::VectorIndexUpdatedHandler,
        handler_workspace_provision::WorkspaceProvisionHandler,
    },
    ports::{
        chunk_repository::ChunkRepository,
        document_repository::{DocumentRepository, WorkspaceRepository},
        graph_store::GraphStore,
        query_context_repository::QueryContextRepository,
        source_file_repository::SourceFileRepository,
        vector_store::{VectorStore, VectorStoreError},
    },
    repositories::{
        chunk_postgres_repository::ChunkPostgresRepository,
        content_point_in_memory_repository::InMemoryVectorStore,
        content_point_qdrant_repository::ContentPointQdrantRepository,
        document_postgres_repository::DocumentPostgresRepository,
        graph_postgres_repository::GraphPostgresRepository,
        in_memory_repositories::{
            InMemoryChunkRepository, InMemoryDocumentRepository, InMemoryGraphStore,
            InMemoryQueryContextRepository, InMemoryWorkspaceRepository,
        },
        query_context_postgres_repository::QueryContextPostgresRepository,
        source_file_fs_repository::SourceFileFsRepository,
        workspace_postgres_repository::WorkspacePostgresRepository,
    },
};

/// Opens broker channels for the workers and the publisher of the application
///
/// Every call returns a handle with its own connection lifecycle:
/// a worker disconnects its handle when it stops.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, MessageBrokerError>;

    async fn connect_publisher(&self) -> Result<Arc<dyn MessagePublisher>, MessageBrokerError>;
}

/// One RabbitMQ connection per worker, one for publishing
pub struct RabbitMQConnector {
    settings: RabbitMQSettings,
}

impl RabbitMQConnector {
    pub fn new(settings: RabbitMQSettings) -> Self {
        Self { settings }
    }

    async fn connect_repository(&self) -> Result<RabbitMQMessageRepository, MessageBrokerError> {
        RabbitMQMessageRepository::connect(
            &self.settings.get_uri(),
            self.settings.get_connection_properties(),
            &self.settings.content_exchange_name(),
        )
        .await
    }
}

#[async_trait]
impl BrokerConnector for RabbitMQConnector {
    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, MessageBrokerError> {
        Ok(Arc::new(self.connect_repository().await?))
    }

    async fn connect_publisher(&self) -> Result<Arc<dyn MessagePublisher>, MessageBrokerError> {
        Ok(Arc::new(self.connect_repository().await?))
    }
}

#[async_trait]
impl BrokerConnector for InMemoryMessageBroker {
    async fn connect(&self) -> Result<Arc<dyn MessageBroker>, MessageBrokerError> {
        Ok(Arc::new(self.connection()))
    }

    async fn connect_publisher(&self) -> Result<Arc<dyn MessagePublisher>, MessageBrokerError> {
        Ok(Arc::new(self.connection()))
    }
}

/// Storage adapters and services shared by every stage of the process
#[derive(Clone)]
pub struct PipelineComponents {
    pub documents: Arc<dyn DocumentRepository>,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub graph: Arc<dyn GraphStore>,
    pub query_contexts: Arc<dyn QueryContextRepository>,
    pub source_files: Arc<dyn SourceFileRepository>,
    pub vector_store: Arc<dyn VectorStore>,
    pub encoder: Arc<dyn EmbeddingEncoder>,
    pub chunker: Arc<dyn Chunker>,
    pub parser: Arc<dyn Parser>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub enricher: Arc<dyn Enricher>,
}

impl PipelineComponents {
    #[tracing::instrument(name = "Building pipeline components", skip(settings))]
    pub async fn from_settings(settings: &Settings) -> Result<Self, ApplicationError> {
        let encoder = build_embedding_encoder(&settings.embedding)?;
        let chunker = build_chunker(&settings.chunking)?;
        let vector_store = build_vector_store(&settings.vector_store).await?;
        let source_files = Arc::new(SourceFileFsRepository::new(
            &settings.source_storage.base_path,
        ));

        let components = match settings.repository.kind {
            RepositoryKind::Postgres => {
                let pool = get_connection_pool(settings);
                Self {
                    documents: Arc::new(DocumentPostgresRepository::new(pool.clone())),
                    workspaces: Arc::new(WorkspacePostgresRepository::new(pool.clone())),
                    chunks: Arc::new(ChunkPostgresRepository::new(pool.clone())),
                    graph: Arc::new(GraphPostgresRepository::new(pool.clone())),
                    query_contexts: Arc::new(QueryContextPostgresRepository::new(pool)),
                    source_files,
                    vector_store,
                    encoder,
                    chunker,
                    parser: Arc::new(SourceParser::new()),
                    extractor: Arc::new(CapitalizedPhraseExtractor::default()),
                    enricher: Arc::new(KeywordEnricher::default()),
                }
            }
            RepositoryKind::InMemory => Self {
                documents: Arc::new(InMemoryDocumentRepository::default()),
                workspaces: Arc::new(InMemoryWorkspaceRepository::default()),
                chunks: Arc::new(InMemoryChunkRepository::default()),
                graph: Arc::new(InMemoryGraphStore::default()),
                query_contexts: Arc::new(InMemoryQueryContextRepository::default()),
                source_files,
                vector_store,
                encoder,
                chunker,
                parser: Arc::new(SourceParser::new()),
                extractor: Arc::new(CapitalizedPhraseExtractor::default()),
                enricher: Arc::new(KeywordEnricher::default()),
            },
        };

        Ok(components)
    }

    /// The encoder must produce vectors the store accepts
    pub fn check_dimensions(&self) -> Result<(), ApplicationError> {
        let encoder = self.encoder.dimension();
        let vector_store = self.vector_store.dimension();
        if encoder != vector_store {
            return Err(ApplicationError::DimensionMismatch {
                encoder,
                vector_store,
            });
        }
        Ok(())
    }
}

/// Lazy pool: the database is reached on the first query
pub fn get_connection_pool(settings: &Settings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(settings.database.with_db())
}

async fn build_vector_store(
    settings: &VectorStoreSettings,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    let vector_store: Arc<dyn VectorStore> = match settings.kind {
        VectorStoreKind::Qdrant => {
            Arc::new(ContentPointQdrantRepository::from_settings(settings).await?)
        }
        VectorStoreKind::InMemory => Arc::new(InMemoryVectorStore::new(
            &settings.collection,
            settings.collection_vector_size as usize,
        )),
    };

    Ok(vector_store)
}

/// Holds the workers of the enabled stages, each one running on its own task
pub struct Application {
    broadcaster: Arc<StatusBroadcaster>,
    status_service: Arc<StatusService>,
    indexer: Arc<Indexer>,
    query_service: Arc<QueryService>,
    shutdown_token: CancellationToken,
    handlers: Vec<JoinHandle<()>>,
}

impl Application {
    #[tracing::instrument(name = "Building worker application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let components = PipelineComponents::from_settings(&settings).await?;
        let connector = RabbitMQConnector::new(settings.rabbitmq.clone());

        Self::build_with(settings, components, &connector).await
    }

    /// Builds the application on the given adapters, integration tests use in-memory ones
    #[tracing::instrument(name = "Building worker application with components", skip_all)]
    pub async fn build_with(
        settings: Settings,
        components: PipelineComponents,
        connector: &dyn BrokerConnector,
    ) -> Result<Self, ApplicationError> {
        components.check_dimensions()?;
        let publisher = connector.connect_publisher().await?;

        let status_service = Arc::new(
            StatusService::new(components.documents.clone(), components.workspaces.clone())
                .with_publisher(publisher.clone()),
        );
        let broadcaster = Arc::new(StatusBroadcaster::new(
            settings.broadcaster.channel_capacity,
        ));
        let indexer = Arc::new(Indexer::new(
            components.parser.clone(),
            components.chunker.clone(),
            components.encoder.clone(),
            components.vector_store.clone(),
        ));
        let query_service = Arc::new(QueryService::new(
            components.encoder.clone(),
            components.vector_store.clone(),
        ));

        let mut app = Self {
            broadcaster,
            status_service,
            indexer,
            query_service,
            shutdown_token: CancellationToken::new(),
            handlers: vec![],
        };

        let router = app.build_router(
            &settings.application.enabled_stages(),
            &components,
            publisher,
        )?;
        app.spawn_workers(&settings.rabbitmq, &router, connector)
            .await?;

        Ok(app)
    }

    /// Registers the processor of every enabled stage under its binding key
    fn build_router(
        &self,
        stages: &[Stage],
        components: &PipelineComponents,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Result<EventRouter, ApplicationError> {
        let mut router = EventRouter::new();

        for stage in stages {
            let processor: Arc<dyn MessageProcessor> = match stage {
                Stage::Parse => Arc::new(DocumentUploadedHandler::new(
                    self.indexer.clone(),
                    self.status_service.clone(),
                    components.documents.clone(),
                    components.chunks.clone(),
                    components.source_files.clone(),
                    publisher.clone(),
                )),
                Stage::Chunk => Arc::new(DocumentChunkedHandler::new(
                    components.documents.clone(),
                    components.chunks.clone(),
                    components.encoder.clone(),
                    publisher.clone(),
                )),
                Stage::Embed => Arc::new(EmbeddingsGenerateHandler::new(
                    self.indexer.clone(),
                    self.status_service.clone(),
                    components.documents.clone(),
                    components.chunks.clone(),
                    publisher.clone(),
                )),
                Stage::EntityExtraction => Arc::new(VectorIndexUpdatedHandler::new(
                    components.documents.clone(),
                    components.chunks.clone(),
                    components.extractor.clone(),
                    publisher.clone(),
                )),
                Stage::Graph => Arc::new(DocumentGraphBuildHandler::new(
                    components.documents.clone(),
                    components.graph.clone(),
                    publisher.clone(),
                )),
                Stage::Enrichment => Arc::new(GraphUpdatedHandler::new(
                    components.documents.clone(),
                    components.chunks.clone(),
                    components.enricher.clone(),
                    publisher.clone(),
                )),
                Stage::Deletion => Arc::new(DocumentDeletedHandler::new(
                    components.documents.clone(),
                    components.chunks.clone(),
                    components.graph.clone(),
                    components.vector_store.clone(),
                )),
                Stage::Reprocess => Arc::new(DocumentReprocessHandler::new(
                    self.status_service.clone(),
                    components.chunks.clone(),
                    components.graph.clone(),
                    components.vector_store.clone(),
                    publisher.clone(),
                )),
                Stage::WorkspaceProvision => Arc::new(WorkspaceProvisionHandler::new(
                    components.workspaces.clone(),
                    components.vector_store.clone(),
                    self.status_service.clone(),
                )),
                Stage::Query => Arc::new(QueryPrepareHandler::new(
                    self.query_service.clone(),
                    components.extractor.clone(),
                    components.graph.clone(),
                    components.query_contexts.clone(),
                    publisher.clone(),
                )),
                Stage::StatusBroadcast => {
                    Arc::new(StatusUpdatedHandler::new(self.broadcaster.clone()))
                }
            };

            router.register(stage.name(), stage.binding_key(), processor)?;
        }

        Ok(router)
    }

    /// Starts one worker per route, all of them stopped by the same token
    #[tracing::instrument(name = "Spawning the message workers", skip_all)]
    async fn spawn_workers(
        &mut self,
        settings: &RabbitMQSettings,
        router: &EventRouter,
        connector: &dyn BrokerConnector,
    ) -> Result<(), ApplicationError> {
        let retry_policy = RetryPolicy {
            max_retries: settings.max_retries,
        };

        for route in router.routes() {
            let queue_name = format!("{}_{}", settings.queue_name_prefix, route.name);
            let broker = connector.connect().await?;

            let worker = MessageWorker::new(
                WorkerSettings {
                    name: route.name.clone(),
                    queue_name,
                    binding_key: route.binding_key.clone(),
                    prefetch_count: settings.prefetch_count,
                    retry_policy,
                },
                broker,
                route.processor.clone(),
            )
            .with_shutdown_token(self.shutdown_token.clone());

            let handler = tokio::spawn(async move {
                if let Err(error) = worker.start().await {
                    error!(?error, worker = worker.name(), "Worker failed");
                }
            });
            self.handlers.push(handler);
        }

        info!("Started {} workers", self.handlers.len());
        Ok(())
    }

    pub fn broadcaster(&self) -> Arc<StatusBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn status_service(&self) -> Arc<StatusService> {
        self.status_service.clone()
    }

    pub fn indexer(&self) -> Arc<Indexer> {
        self.indexer.clone()
    }

    pub fn query_service(&self) -> Arc<QueryService> {
        self.query_service.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.handlers.len()
    }

    /// Stops every worker, in-flight messages are finished first
    pub fn stop(&self) {
        self.shutdown_token.cancel();
    }

    /// Runs the application until every worker stopped
    ///
    /// self is moved in order for the application not to drop out of scope
    /// and move into a thread for ex
    pub async fn run_until_stopped(self) -> Result<(), ApplicationError> {
        let handler_results = join_all(self.handlers).await;

        let panicked = handler_results
            .iter()
            .filter(|result| result.is_err())
            .count();
        if panicked > 0 {
            error!("{} workers panicked", panicked);
        }

        info!("👋 Bye!");
        Ok(())
    }
}

#[derive(thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    MessageBrokerError(#[from] MessageBrokerError),
    #[error(transparent)]
    EventRouterError(#[from] EventRouterError),
    #[error(transparent)]
    VectorStoreError(#[from] VectorStoreError),
    #[error(transparent)]
    EmbeddingError(#[from] EmbeddingError),
    #[error(transparent)]
    ChunkerError(#[from] ChunkerError),
    #[error(
        "The embedding model produces vectors of dimension {encoder}, \
        the vector store holds vectors of dimension {vector_store}"
    )]
    DimensionMismatch { encoder: usize, vector_store: usize },
}

impl std::fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
