//! Engine registry mapping each model to the embedder serving it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use embed_dispatch_common::{params, EngineKind, ModelDescriptor, ModelRegistry};
use tokio::sync::RwLock;

use super::hash::DEFAULT_DIMENSION;
use super::{EmbedError, Embedder, EngineHealth, HashEmbedder, OllamaEmbedder};
use crate::config::EnginesConfig;
use crate::error::{Error, Result};

/// Registry of the embedders loaded for each model key.
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<dyn Embedder>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Build one embedder per registered model.
    pub async fn from_models(models: &ModelRegistry, config: &EnginesConfig) -> Result<Self> {
        Self::from_descriptors(models.list(), config).await
    }

    /// Build one embedder for each of `descriptors`.
    pub async fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a ModelDescriptor>,
        config: &EnginesConfig,
    ) -> Result<Self> {
        let registry = Self::new();
        for descriptor in descriptors {
            let engine = build_engine(descriptor, config)?;
            tracing::info!(
                model_key = %descriptor.model_key,
                engine = engine.engine_type(),
                "Registered embedding engine"
            );
            registry.register(&descriptor.model_key, engine).await;
        }
        Ok(registry)
    }

    /// Register an engine for a model, replacing any previous one.
    pub async fn register(&self, model_key: &str, engine: Arc<dyn Embedder>) {
        let mut engines = self.engines.write().await;
        engines.insert(model_key.to_string(), engine);
    }

    pub async fn get(&self, model_key: &str) -> Option<Arc<dyn Embedder>> {
        let engines = self.engines.read().await;
        engines.get(model_key).cloned()
    }

    /// Get all registered engines with their model keys.
    pub async fn all(&self) -> Vec<(String, Arc<dyn Embedder>)> {
        let engines = self.engines.read().await;
        engines
            .iter()
            .map(|(key, engine)| (key.clone(), engine.clone()))
            .collect()
    }

    /// Run a health check against every engine.
    pub async fn health_report(&self) -> Vec<(String, std::result::Result<EngineHealth, EmbedError>)> {
        // Clone engines to avoid holding the lock across async calls
        let engines = self.all().await;

        let mut report = Vec::with_capacity(engines.len());
        for (model_key, engine) in engines {
            report.push((model_key, engine.health_check().await));
        }
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the embedder described by a model descriptor.
pub fn build_engine(
    descriptor: &ModelDescriptor,
    config: &EnginesConfig,
) -> Result<Arc<dyn Embedder>> {
    match descriptor.engine {
        EngineKind::Hash => {
            let dimension = descriptor.embedding_dim().unwrap_or(DEFAULT_DIMENSION);
            if dimension == 0 {
                return Err(Error::InvalidModelConfig {
                    model_key: descriptor.model_key.clone(),
                    reason: format!("{} must be positive", params::EMBEDDING_DIM),
                });
            }
            Ok(Arc::new(HashEmbedder::new(dimension)))
        }
        EngineKind::Ollama => {
            let ollama = config
                .ollama
                .as_ref()
                .ok_or_else(|| Error::EngineNotConfigured {
                    model_key: descriptor.model_key.clone(),
                    engine: descriptor.engine.as_str().to_string(),
                })?;
            let model = descriptor
                .param(params::MODEL)
                .and_then(|v| v.as_str())
                .unwrap_or(&descriptor.model_key);
            let engine = OllamaEmbedder::new(
                &ollama.base_url,
                model,
                descriptor.embedding_dim(),
                Duration::from_secs(ollama.timeout_secs),
            )
            .map_err(|e| Error::EngineInit(e.to_string()))?;
            Ok(Arc::new(engine))
        }
    }
}
