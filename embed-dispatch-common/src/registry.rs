//! Model registry: the static set of embedding models this deployment serves.
//!
//! The registry is built once at startup and never mutated afterwards, so it
//! can be shared as an `Arc<ModelRegistry>` between the dispatcher, the queue
//! router and every worker without locking.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::model::{ModelConfig, ModelDescriptor};
use crate::routing::default_queue_name;

/// Errors from model lookup and registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown model '{0}'")]
    UnknownModel(String),
    #[error("Model key must not be empty")]
    EmptyKey,
    #[error("Duplicate model key '{0}'")]
    DuplicateKey(String),
    #[error("Queue '{queue}' is assigned to both '{first}' and '{second}'")]
    DuplicateQueue {
        queue: String,
        first: String,
        second: String,
    },
    #[error("No models configured")]
    NoModels,
}

/// Immutable registry of model descriptors keyed by model key.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry from fully specified descriptors.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ModelDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut models = BTreeMap::new();
        let mut queues: HashMap<String, String> = HashMap::new();

        for descriptor in descriptors {
            if descriptor.model_key.trim().is_empty() {
                return Err(RegistryError::EmptyKey);
            }
            if models.contains_key(&descriptor.model_key) {
                return Err(RegistryError::DuplicateKey(descriptor.model_key));
            }
            if let Some(first) = queues.get(&descriptor.queue_name) {
                return Err(RegistryError::DuplicateQueue {
                    queue: descriptor.queue_name.clone(),
                    first: first.clone(),
                    second: descriptor.model_key,
                });
            }
            queues.insert(descriptor.queue_name.clone(), descriptor.model_key.clone());
            models.insert(descriptor.model_key.clone(), descriptor);
        }

        if models.is_empty() {
            return Err(RegistryError::NoModels);
        }

        Ok(Self { models })
    }

    /// Build a registry from configuration entries keyed by model key.
    ///
    /// Missing queue names are derived with [`default_queue_name`], missing
    /// display names fall back to the model key.
    pub fn from_configs(
        configs: impl IntoIterator<Item = (String, ModelConfig)>,
    ) -> Result<Self, RegistryError> {
        let descriptors = configs.into_iter().map(|(model_key, config)| ModelDescriptor {
            display_name: config.display_name.unwrap_or_else(|| model_key.clone()),
            queue_name: config
                .queue_name
                .unwrap_or_else(|| default_queue_name(&model_key)),
            description: config.description,
            version: config.version,
            engine: config.engine,
            runtime_params: config.params,
            model_key,
        });
        Self::from_descriptors(descriptors)
    }

    /// Look up a model by key.
    pub fn resolve(&self, model_key: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.models
            .get(model_key)
            .ok_or_else(|| RegistryError::UnknownModel(model_key.to_string()))
    }

    /// All models, ordered by key.
    pub fn list(&self) -> Vec<&ModelDescriptor> {
        self.models.values().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
