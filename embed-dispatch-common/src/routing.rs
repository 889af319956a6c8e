//! Queue routing policy.
//!
//! Producers (the dispatcher) and consumers (worker loops) must agree on the
//! queue a model's tasks travel through, so the naming convention lives here
//! and nowhere else.

use std::sync::Arc;

use crate::registry::{ModelRegistry, RegistryError};

/// Prefix shared by every embedding task queue.
pub const QUEUE_PREFIX: &str = "text_embedding";

/// Suffix appended to a queue name to form its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = ".dead_letter";

/// Queue name used when a model's configuration does not set one.
pub fn default_queue_name(model_key: &str) -> String {
    format!("{}_{}_queue", QUEUE_PREFIX, model_key)
}

/// Dead-letter queue paired with `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}{}", queue, DEAD_LETTER_SUFFIX)
}

/// Routes model keys to their dedicated queues.
#[derive(Debug, Clone)]
pub struct QueueRouter {
    registry: Arc<ModelRegistry>,
}

impl QueueRouter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Destination queue for `model_key`.
    ///
    /// Fails with [`RegistryError::UnknownModel`] when the key is not registered.
    pub fn route(&self, model_key: &str) -> Result<&str, RegistryError> {
        self.registry
            .resolve(model_key)
            .map(|descriptor| descriptor.queue_name.as_str())
    }

    /// Every `(model_key, queue_name)` binding, ordered by model key.
    pub fn bindings(&self) -> Vec<(&str, &str)> {
        self.registry
            .list()
            .into_iter()
            .map(|d| (d.model_key.as_str(), d.queue_name.as_str()))
            .collect()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}
