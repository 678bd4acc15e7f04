use lapin::ConnectionProperties;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};

use common::constants::routing_keys::{
    DOCUMENT_CHUNKED_ROUTING_KEY, DOCUMENT_DELETED_ROUTING_KEY, DOCUMENT_GRAPH_BUILD_ROUTING_KEY,
    DOCUMENT_REPROCESS_ROUTING_KEY, DOCUMENT_UPLOADED_ROUTING_KEY, EMBEDDINGS_GENERATE_ROUTING_KEY,
    GRAPH_UPDATED_ROUTING_KEY, QUERY_PREPARE_ROUTING_KEY, STATUS_UPDATED_BINDING_KEY,
    VECTOR_INDEX_UPDATED_ROUTING_KEY, WORKSPACE_PROVISION_ROUTING_KEY,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub rabbitmq: RabbitMQSettings,
    pub database: DatabaseSettings,
    pub repository: RepositorySettings,
    pub source_storage: SourceStorageSettings,
    pub vector_store: VectorStoreSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub broadcaster: BroadcasterSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub name: String,
    /// Stages run by this process. Every stage if empty.
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl ApplicationSettings {
    pub fn enabled_stages(&self) -> Vec<Stage> {
        if self.stages.is_empty() {
            Stage::all().to_vec()
        } else {
            self.stages.clone()
        }
    }
}

/// A pipeline stage: one queue, one binding key, one processor
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Chunk,
    Embed,
    EntityExtraction,
    Graph,
    Enrichment,
    Deletion,
    Reprocess,
    WorkspaceProvision,
    Query,
    StatusBroadcast,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Parse,
            Stage::Chunk,
            Stage::Embed,
            Stage::EntityExtraction,
            Stage::Graph,
            Stage::Enrichment,
            Stage::Deletion,
            Stage::Reprocess,
            Stage::WorkspaceProvision,
            Stage::Query,
            Stage::StatusBroadcast,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::EntityExtraction => "entity_extraction",
            Stage::Graph => "graph",
            Stage::Enrichment => "enrichment",
            Stage::Deletion => "deletion",
            Stage::Reprocess => "reprocess",
            Stage::WorkspaceProvision => "workspace_provision",
            Stage::Query => "query",
            Stage::StatusBroadcast => "status_broadcast",
        }
    }

    pub fn binding_key(&self) -> &'static str {
        match self {
            Stage::Parse => DOCUMENT_UPLOADED_ROUTING_KEY,
            Stage::Chunk => DOCUMENT_CHUNKED_ROUTING_KEY,
            Stage::Embed => EMBEDDINGS_GENERATE_ROUTING_KEY,
            Stage::EntityExtraction => VECTOR_INDEX_UPDATED_ROUTING_KEY,
            Stage::Graph => DOCUMENT_GRAPH_BUILD_ROUTING_KEY,
            Stage::Enrichment => GRAPH_UPDATED_ROUTING_KEY,
            Stage::Deletion => DOCUMENT_DELETED_ROUTING_KEY,
            Stage::Reprocess => DOCUMENT_REPROCESS_ROUTING_KEY,
            Stage::WorkspaceProvision => WORKSPACE_PROVISION_ROUTING_KEY,
            Stage::Query => QUERY_PREPARE_ROUTING_KEY,
            Stage::StatusBroadcast => STATUS_UPDATED_BINDING_KEY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RabbitMQSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    /// Useful to create parallel exchanges during tests for example.
    pub exchange_name_prefix: String,
    pub content_exchange: String,
    /// Useful to create parallel queues during tests for example.
    pub queue_name_prefix: String,
    /// Maximum number of unacknowledged messages delivered to a worker
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub prefetch_count: u16,
    /// Retries before a message is dead-lettered. Requeued forever if not set.
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub max_retries: Option<u32>,
}

impl RabbitMQSettings {
    pub fn get_uri(&self) -> String {
        format!("amqp://{}:{}", &self.host, &self.port)
    }

    pub fn get_connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            // Use tokio executor and reactor.
            // At the moment the reactor is only available for unix.
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }

    pub fn content_exchange_name(&self) -> String {
        format!("{}_{}", self.exchange_name_prefix, self.content_exchange)
    }

    pub fn queue_name(&self, stage: Stage) -> String {
        format!("{}_{}", self.queue_name_prefix, stage.name())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    // Determines if we demand the connection to be encrypted or not
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            // Try an encrypted connection, fallback to unencrypted if it fails
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        let mut options = self.without_db().database(&self.database_name);
        // Lowers sqlx logs from INFO to TRACE level.
        options.log_statements(tracing::log::LevelFilter::Trace);
        options
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    Postgres,
    InMemory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositorySettings {
    pub kind: RepositoryKind,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceStorageSettings {
    /// Directory against which the storage path of uploaded documents is resolved
    pub base_path: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreKind {
    Qdrant,
    InMemory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreSettings {
    pub kind: VectorStoreKind,
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub grpc_port: u16,
    pub collection: String,
    /// Name of a Qdrant distance: `Cosine`, `Euclid` or `Dot`
    pub collection_distance: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub collection_vector_size: u64,
}

impl VectorStoreSettings {
    pub fn get_grpc_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.grpc_port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    Http,
    Hashing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSettings {
    pub kind: EmbeddingKind,
    pub model: String,
    /// Base url of an OpenAI compatible API, `/embeddings` is appended to it
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dimension: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerKind {
    Fixed,
    Sentence,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingSettings {
    pub kind: ChunkerKind,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub chunk_size: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcasterSettings {
    /// Notifications buffered per user channel before slow subscribers start lagging
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub channel_capacity: usize,
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` should contain shared settings for all environments.
/// A specific env file should be created for each environment: `develop.yaml`,`local.yaml` and `production.yaml`
/// The environment is set with the env var `APP_ENVIRONMENT`.
/// If `APP_ENVIRONMENT` is not set, `develop.yaml` is the default.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_RABBITMQ__PREFETCH_COUNT=5` would set `Settings.rabbitmq.prefetch_count`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    // Detects the running environment.
    // Default to `develop` if unspecified.
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Adds in settings from environment variables (with a prefix of APP and '__' as separator)
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
