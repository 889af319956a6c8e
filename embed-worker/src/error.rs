//! Error types for the embedding workers.

use embed_dispatch_common::{BrokerError, RegistryError};

/// Errors setting up engines and worker slots.
///
/// Task-level failures never surface here: they end as a terminal task
/// result or a dead-lettered message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Engine '{engine}' for model '{model_key}' is not configured")]
    EngineNotConfigured { model_key: String, engine: String },

    #[error("Invalid configuration for model '{model_key}': {reason}")]
    InvalidModelConfig { model_key: String, reason: String },

    #[error("No engine registered for model '{0}'")]
    NoEngine(String),

    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, Error>;
