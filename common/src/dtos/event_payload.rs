use serde::{de::DeserializeOwned, Serialize};

use crate::{
    core::message_broker::{MessageBrokerError, MessagePublisher},
    helper::error_chain_fmt,
};

/// An event exchanged between the pipeline stages.
///
/// Each payload type is published under exactly one routing key,
/// encoded as JSON.
pub trait EventPayload: Serialize + DeserializeOwned + std::fmt::Debug + Send + Sync {
    const ROUTING_KEY: &'static str;

    fn try_parsing(data: &[u8]) -> Result<Self, EventPayloadError> {
        let data = std::str::from_utf8(data)?;
        let event = serde_json::from_str(data)
            .map_err(|e| EventPayloadError::InvalidJsonData(e, data.to_string()))?;

        Ok(event)
    }

    fn try_serializing(&self) -> Result<Vec<u8>, EventPayloadError> {
        serde_json::to_vec(self).map_err(EventPayloadError::InvalidEvent)
    }
}

/// Serializes `event` and publishes it under its routing key
#[tracing::instrument(name = "Publishing event", skip(publisher), fields(routing_key = E::ROUTING_KEY))]
pub async fn publish_event<E: EventPayload>(
    publisher: &dyn MessagePublisher,
    event: &E,
) -> Result<(), PublishEventError> {
    let data = event.try_serializing()?;
    publisher.publish(E::ROUTING_KEY, &data).await?;

    Ok(())
}

#[derive(thiserror::Error)]
pub enum EventPayloadError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),

    #[error("Data did not represent a valid JSON event: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),

    #[error("Event could not be serialized to JSON: {0}")]
    InvalidEvent(serde_json::Error),
}

impl std::fmt::Debug for EventPayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(thiserror::Error)]
pub enum PublishEventError {
    #[error(transparent)]
    EventPayloadError(#[from] EventPayloadError),
    #[error(transparent)]
    MessageBrokerError(#[from] MessageBrokerError),
}

impl std::fmt::Debug for PublishEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
