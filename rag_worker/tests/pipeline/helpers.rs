use std::{future::Future, sync::Arc, time::Duration};

use common::{
    core::in_memory_message_broker::InMemoryMessageBroker,
    dtos::event_payload::{publish_event, EventPayload},
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use once_cell::sync::Lazy;
use rag_worker::{
    configuration::{get_configuration, ChunkerKind, Settings, Stage},
    domain::{
        entities::{document::Document, workspace::Workspace},
        services::{
            chunker::FixedSizeChunker, embedding_encoder::HashingEmbeddingEncoder,
            enricher::KeywordEnricher, entity_extractor::CapitalizedPhraseExtractor,
            indexer::Indexer, parser::SourceParser, query::QueryService,
            status_broadcaster::StatusBroadcaster, status_service::StatusService,
        },
    },
    ports::document_repository::{DocumentRepository, WorkspaceRepository},
    repositories::{
        content_point_in_memory_repository::InMemoryVectorStore,
        in_memory_repositories::{
            InMemoryChunkRepository, InMemoryDocumentRepository, InMemoryGraphStore,
            InMemoryQueryContextRepository, InMemoryWorkspaceRepository,
        },
        source_file_in_memory_repository::SourceFileInMemoryRepository,
    },
    startup::{Application, ApplicationError, PipelineComponents},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // The sink is part of the subscriber type, hence the two branches
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    };
});

pub const EMBEDDING_MODEL: &str = "hashing-test";
pub const EMBEDDING_DIMENSION: usize = 64;
pub const CHUNK_SIZE: usize = 100;
pub const COLLECTION: &str = "test_content_points";

pub struct TestApp {
    pub settings: Settings,
    pub broker: InMemoryMessageBroker,
    pub documents: Arc<InMemoryDocumentRepository>,
    pub workspaces: Arc<InMemoryWorkspaceRepository>,
    pub chunks: Arc<InMemoryChunkRepository>,
    pub graph: Arc<InMemoryGraphStore>,
    pub query_contexts: Arc<InMemoryQueryContextRepository>,
    pub source_files: Arc<SourceFileInMemoryRepository>,
    pub vector_store: Arc<InMemoryVectorStore>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub status_service: Arc<StatusService>,
    pub indexer: Arc<Indexer>,
    pub query_service: Arc<QueryService>,
    shutdown_token: CancellationToken,
    handle: JoinHandle<Result<(), ApplicationError>>,
}

/// Builds the worker on in-memory adapters, running every stage
///
/// Returns once every stage queue is declared: events published after that are consumed.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_stages(Stage::all()).await
}

pub async fn spawn_app_with_stages(stages: &[Stage]) -> TestApp {
    Lazy::force(&TRACING);

    // Randomizes the configuration to isolate each test
    let settings = {
        let mut settings = get_configuration().expect("Failed to read configuration.");
        settings.application.stages = stages.to_vec();
        settings.rabbitmq.queue_name_prefix = format!("test_{}", Uuid::new_v4());
        settings.rabbitmq.max_retries = Some(2);
        settings.chunking.kind = ChunkerKind::Fixed;
        settings.chunking.chunk_size = CHUNK_SIZE;
        settings.chunking.chunk_overlap = 0;
        settings.embedding.model = EMBEDDING_MODEL.to_string();
        settings.embedding.dimension = EMBEDDING_DIMENSION;
        settings.vector_store.collection = COLLECTION.to_string();
        settings
    };

    let documents = Arc::new(InMemoryDocumentRepository::default());
    let workspaces = Arc::new(InMemoryWorkspaceRepository::default());
    let chunks = Arc::new(InMemoryChunkRepository::default());
    let graph = Arc::new(InMemoryGraphStore::default());
    let query_contexts = Arc::new(InMemoryQueryContextRepository::default());
    let source_files = Arc::new(SourceFileInMemoryRepository::default());
    let vector_store = Arc::new(InMemoryVectorStore::new(COLLECTION, EMBEDDING_DIMENSION));

    let components = PipelineComponents {
        documents: documents.clone(),
        workspaces: workspaces.clone(),
        chunks: chunks.clone(),
        graph: graph.clone(),
        query_contexts: query_contexts.clone(),
        source_files: source_files.clone(),
        vector_store: vector_store.clone(),
        encoder: Arc::new(HashingEmbeddingEncoder::new(
            EMBEDDING_MODEL,
            EMBEDDING_DIMENSION,
        )),
        chunker: Arc::new(
            FixedSizeChunker::try_new(CHUNK_SIZE, 0).expect("Failed to build the chunker"),
        ),
        parser: Arc::new(SourceParser::new()),
        extractor: Arc::new(CapitalizedPhraseExtractor::default()),
        enricher: Arc::new(KeywordEnricher::default()),
    };

    let broker = InMemoryMessageBroker::new();
    let application = Application::build_with(settings.clone(), components, &broker)
        .await
        .expect("Failed to build application.");
    let broadcaster = application.broadcaster();
    let status_service = application.status_service();
    let indexer = application.indexer();
    let query_service = application.query_service();
    let shutdown_token = application.shutdown_token();
    let handle = tokio::spawn(application.run_until_stopped());

    let app = TestApp {
        settings,
        broker,
        documents,
        workspaces,
        chunks,
        graph,
        query_contexts,
        source_files,
        vector_store,
        broadcaster,
        status_service,
        indexer,
        query_service,
        shutdown_token,
        handle,
    };
    app.wait_for_queues(stages).await;
    app
}

impl TestApp {
    async fn wait_for_queues(&self, stages: &[Stage]) {
        for stage in stages {
            let queue_name = self.queue_name(*stage);
            let declared =
                wait_until(|| async { self.broker.is_queue_declared(&queue_name).await }).await;
            assert!(declared, "The worker did not declare the queue {}", queue_name);
        }
    }

    pub fn queue_name(&self, stage: Stage) -> String {
        self.settings.rabbitmq.queue_name(stage)
    }

    pub async fn publish<E: EventPayload>(&self, event: &E) {
        publish_event(&self.broker, event)
            .await
            .expect("Failed to publish event");
    }

    /// Stores a workspace, a pending document and its source file
    pub async fn seed_document(&self, filename: &str, content: &str) -> Document {
        let workspace = Workspace::new(Uuid::new_v4(), Uuid::new_v4(), "Test workspace");
        self.workspaces
            .insert_if_missing(&workspace)
            .await
            .expect("Failed to store workspace");

        self.seed_document_in(&workspace, filename, content).await
    }

    pub async fn seed_document_in(
        &self,
        workspace: &Workspace,
        filename: &str,
        content: &str,
    ) -> Document {
        let document_id = Uuid::new_v4();
        let storage_path = format!("{}/{}/{}", workspace.id, document_id, filename);
        let document = Document::new(
            document_id,
            workspace.id,
            workspace.user_id,
            filename,
            &storage_path,
        );

        self.documents
            .save(&document)
            .await
            .expect("Failed to store document");
        self.source_files.put(&storage_path, content).await;

        document
    }

    pub async fn get_document(&self, document_id: Uuid) -> Option<Document> {
        self.documents
            .get(document_id)
            .await
            .expect("Failed to get document")
    }

    /// Published events of type `E`, in publication order
    pub async fn published<E: EventPayload>(&self) -> Vec<E> {
        self.broker
            .published_with_routing_key(E::ROUTING_KEY)
            .await
            .iter()
            .map(|data| E::try_parsing(data).expect("Published event is invalid"))
            .collect()
    }

    /// Stops the workers and waits for them to finish
    pub async fn stop(self) {
        self.shutdown_token.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
        assert!(stopped.is_ok(), "The workers did not stop");
    }
}

/// Polls `condition` every 20ms for up to 5s
pub async fn wait_until<F, Fut>(condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Text of 256 chars without whitespace runs: 3 chunks of at most 100 chars
pub fn three_chunks_text() -> String {
    "Ferris visits Rust Valley daily.".repeat(8)
}
