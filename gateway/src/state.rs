//! Shared application state.

use std::sync::Arc;

use embed_dispatch_common::{Broker, ModelRegistry, QueueRouter, ResultStore};

use crate::config::Config;
use crate::dispatcher::TaskDispatcher;
use crate::resolver::ResultResolver;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub service_name: String,
    pub registry: Arc<ModelRegistry>,
    pub dispatcher: TaskDispatcher,
    pub resolver: ResultResolver,
}

impl AppState {
    pub fn new(
        config: &Config,
        registry: Arc<ModelRegistry>,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let dispatcher = TaskDispatcher::new(
            QueueRouter::new(registry.clone()),
            broker,
            store.clone(),
            config.api.max_batch_size,
        );
        Self {
            service_name: config.service_name.clone(),
            registry,
            dispatcher,
            resolver: ResultResolver::new(store),
        }
    }
}
