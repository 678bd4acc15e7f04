use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

use crate::helper::error_chain_fmt;

/// Builds the `tracing` subscriber shared by every worker process.
///
/// Layers, from the bottom up:
/// - an `EnvFilter` read from `RUST_LOG`, or `fallback_env_filter` when the variable is not set
/// - a `JsonStorageLayer` keeping the fields of each span so children inherit the message context
///   (routing key, queue, document id ...)
/// - a `BunyanFormattingLayer` writing one bunyan JSON record per event into `sink`
///
/// # Arguments
/// - `name`: name of the worker, written in every record
/// - `fallback_env_filter`: filter used if `RUST_LOG` is not set
/// - `sink`: where the records are written (`std::io::stdout`, `std::io::sink` in tests)
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // The sink must produce a writer for any lifetime
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(name, sink))
}

/// Registers `subscriber` as the process wide default and redirects `log` records to it.
///
/// Must only be called once per process: a second call returns an error.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    LogTracer::init().map_err(|e| TelemetryError::LogTracer(e.to_string()))?;
    set_global_default(subscriber)?;

    Ok(())
}

#[derive(thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to redirect log records to tracing: {0}")]
    LogTracer(String),
    #[error("Failed to set the global tracing subscriber: {0}")]
    GlobalSubscriber(#[from] SetGlobalDefaultError),
}

impl std::fmt::Debug for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
