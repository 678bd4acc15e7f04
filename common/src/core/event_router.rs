use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use super::{
    message_broker::binding_key_matches,
    message_worker::{MessageProcessor, ProcessingError},
};
use crate::helper::error_chain_fmt;

/// A processor registered under a stage name, for the routing keys matching `binding_key`
#[derive(Clone)]
pub struct Route {
    pub name: String,
    pub binding_key: String,
    pub processor: Arc<dyn MessageProcessor>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("binding_key", &self.binding_key)
            .finish()
    }
}

/// Table of the processors run by a process, built once at startup
///
/// Each route gets its own worker and queue. The router itself is also a processor,
/// dispatching on the routing key, for a single queue bound to several keys.
#[derive(Default, Clone, Debug)]
pub struct EventRouter {
    routes: Vec<Route>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        binding_key: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), EventRouterError> {
        if self.route(name).is_some() {
            return Err(EventRouterError::DuplicateRoute(name.to_string()));
        }

        self.routes.push(Route {
            name: name.to_string(),
            binding_key: binding_key.to_string(),
            processor,
        });
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First registered route whose binding key matches `routing_key`
    pub fn resolve(&self, routing_key: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| binding_key_matches(&route.binding_key, routing_key))
    }
}

#[async_trait]
impl MessageProcessor for EventRouter {
    async fn process_event(&self, routing_key: &str, data: &[u8]) -> Result<(), ProcessingError> {
        match self.resolve(routing_key) {
            Some(route) => route.processor.process_event(routing_key, data).await,
            None => Err(ProcessingError::rejected(anyhow!(
                "No processor registered for routing key {}",
                routing_key
            ))),
        }
    }
}

#[derive(thiserror::Error)]
pub enum EventRouterError {
    #[error("A route named {0} is already registered")]
    DuplicateRoute(String),
}

impl std::fmt::Debug for EventRouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
