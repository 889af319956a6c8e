//! Configuration for the embedding workers and their engines.

use std::time::Duration;

use embed_dispatch_common::{ModelDescriptor, ModelRegistry, RegistryError};
use serde::Deserialize;

/// Worker pool and task processing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Model keys served by this process. Empty means every registered model.
    #[serde(default)]
    pub models: Vec<String>,
    /// Concurrent worker loops per model queue. Zero runs no workers here.
    #[serde(default = "default_slots_per_model")]
    pub slots_per_model: usize,
    /// Requeues allowed for a task failing with a retryable error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Upper bound for the retry backoff.
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    /// Watchdog: an attempt running longer than this fails with a timeout.
    #[serde(default = "default_max_processing_secs")]
    pub max_processing_secs: u64,
    /// Delay before reopening a consumer after a broker error.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl WorkerConfig {
    /// Descriptors of the models this process consumes, ordered by key.
    ///
    /// Fails with [`RegistryError::UnknownModel`] when a selected key is not
    /// registered.
    pub fn bound_models<'a>(
        &self,
        registry: &'a ModelRegistry,
    ) -> std::result::Result<Vec<&'a ModelDescriptor>, RegistryError> {
        if self.slots_per_model == 0 {
            return Ok(Vec::new());
        }
        if self.models.is_empty() {
            return Ok(registry.list());
        }

        let mut bound = self
            .models
            .iter()
            .map(|key| registry.resolve(key))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        bound.sort_by(|a, b| a.model_key.cmp(&b.model_key));
        bound.dedup_by(|a, b| a.model_key == b.model_key);
        Ok(bound)
    }

    pub fn max_processing(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            slots_per_model: default_slots_per_model(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            max_processing_secs: default_max_processing_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

/// Engine backend settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnginesConfig {
    #[serde(default)]
    pub ollama: Option<OllamaEngineConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaEngineConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// HTTP timeout for one embed call.
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaEngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            timeout_secs: default_ollama_timeout(),
        }
    }
}

// Default values
fn default_slots_per_model() -> usize {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_retry_backoff_max_ms() -> u64 {
    30_000
}
fn default_max_processing_secs() -> u64 {
    120
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.slots_per_model, 1);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_processing(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_worker_config_uses_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_backoff_ms, 500);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_ollama_config() {
        let ollama = OllamaEngineConfig::default();
        assert_eq!(ollama.base_url, "http://localhost:11434");
        assert_eq!(ollama.timeout_secs, 60);
    }

    fn registry() -> ModelRegistry {
        let configs = ["small", "large"]
            .into_iter()
            .map(|key| (key.to_string(), embed_dispatch_common::ModelConfig::default()));
        ModelRegistry::from_configs(configs).unwrap()
    }

    #[test]
    fn test_bound_models_defaults_to_all() {
        let registry = registry();
        let keys: Vec<_> = WorkerConfig::default()
            .bound_models(&registry)
            .unwrap()
            .into_iter()
            .map(|d| d.model_key.as_str())
            .collect();
        assert_eq!(keys, vec!["large", "small"]);
    }

    #[test]
    fn test_bound_models_selects_and_rejects_unknown() {
        let registry = registry();
        let config = WorkerConfig {
            models: vec!["small".to_string(), "small".to_string()],
            ..Default::default()
        };
        let bound = config.bound_models(&registry).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].model_key, "small");

        let config = WorkerConfig {
            models: vec!["missing".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.bound_models(&registry),
            Err(RegistryError::UnknownModel(key)) if key == "missing"
        ));
    }

    #[test]
    fn test_zero_slots_binds_nothing() {
        let config = WorkerConfig {
            slots_per_model: 0,
            ..Default::default()
        };
        assert!(config.bound_models(&registry()).unwrap().is_empty());
    }
}
