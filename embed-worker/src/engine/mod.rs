//! Embedding engine abstraction layer.
//!
//! This module defines the `Embedder` trait that hides the embedding runtime
//! (a local CPU embedder, an Ollama server, ...) behind one interface. The
//! worker loop treats an engine as an opaque `texts -> vectors` function.

mod hash;
mod ollama;
mod registry;

pub use hash::HashEmbedder;
pub use ollama::OllamaEmbedder;
pub use registry::{build_engine, EngineRegistry};

use async_trait::async_trait;
use embed_dispatch_common::{params, Embeddings, ModelDescriptor, RuntimeParams};

/// Errors from an embedding engine.
///
/// Each variant is either retryable (the same input may succeed later) or
/// terminal, see [`EmbedError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmbedError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::Unavailable(_) | EmbedError::ResourceExhausted(_))
    }
}

/// Health status of an embedding engine.
#[derive(Debug, Clone)]
pub struct EngineHealth {
    pub is_healthy: bool,
    pub version: Option<String>,
    /// Models the engine reports as available.
    pub models: Vec<String>,
}

/// Per-task embedding options, resolved from the model's runtime parameters
/// and the request's overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedOptions {
    pub normalize: bool,
    pub max_seq_length: Option<usize>,
}

impl EmbedOptions {
    pub fn resolve(descriptor: &ModelDescriptor, overrides: &RuntimeParams) -> Self {
        let normalize = overrides
            .get(params::NORMALIZE)
            .and_then(|v| v.as_bool())
            .or_else(|| descriptor.param(params::NORMALIZE).and_then(|v| v.as_bool()))
            .unwrap_or(true);

        let max_seq_length = overrides
            .get(params::MAX_SEQ_LENGTH)
            .and_then(|v| v.as_i64())
            .and_then(|v| usize::try_from(v).ok())
            .or_else(|| descriptor.max_seq_length());

        Self {
            normalize,
            max_seq_length,
        }
    }
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            max_seq_length: None,
        }
    }
}

/// Primary trait for embedding engines.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Engine type name (e.g., "hash", "ollama").
    fn engine_type(&self) -> &'static str;

    /// Output dimension, when known up front.
    fn dimension(&self) -> Option<usize>;

    /// Check the engine is available and responding.
    async fn health_check(&self) -> Result<EngineHealth, EmbedError>;

    /// Embed `texts`, returning one vector per text in input order.
    async fn embed(&self, texts: &[String], options: &EmbedOptions)
        -> Result<Embeddings, EmbedError>;
}

/// Scale `vector` to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

pub(crate) fn validate_texts(texts: &[String]) -> Result<(), EmbedError> {
    if texts.is_empty() {
        return Err(EmbedError::InvalidInput(
            "input texts list cannot be empty".to_string(),
        ));
    }
    if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(EmbedError::InvalidInput(format!(
            "text at index {} is empty",
            index
        )));
    }
    Ok(())
}
