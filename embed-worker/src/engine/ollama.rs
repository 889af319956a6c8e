//! Ollama embedding engine implementation.

use std::time::Duration;

use async_trait::async_trait;
use embed_dispatch_common::Embeddings;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{l2_normalize, validate_texts, EmbedError, EmbedOptions, Embedder, EngineHealth};

/// Ollama embedding engine.
///
/// Calls `/api/embed` on an Ollama server for one model.
pub struct OllamaEmbedder {
    http_client: Client,
    base_url: String,
    model: String,
    dimension: Option<usize>,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama API types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Response from /api/tags endpoint.
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelInfo {
    name: String,
}

/// Map a non-success HTTP status to an engine error.
fn classify_status(status: StatusCode, body: &str) -> EmbedError {
    let detail = format!("Ollama returned {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        EmbedError::ResourceExhausted(detail)
    } else if status.is_server_error() {
        EmbedError::Unavailable(detail)
    } else {
        EmbedError::Rejected(detail)
    }
}

// ============================================================================
// Embedder implementation
// ============================================================================

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn engine_type(&self) -> &'static str {
        "ollama"
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbedError::Unavailable(format!(
                "Ollama returned {}",
                response.status()
            )));
        }

        let tags: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;

        let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        let has_model = models
            .iter()
            .any(|name| name == &self.model || name.split(':').next() == Some(self.model.as_str()));

        Ok(EngineHealth {
            is_healthy: has_model,
            version: None,
            models,
        })
    }

    async fn embed(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Embeddings, EmbedError> {
        validate_texts(texts)?;

        let url = format!("{}/api/embed", self.base_url);
        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
            truncate: true,
        };

        tracing::debug!(
            "Sending embed request to Ollama: {} model={} texts={}",
            url,
            self.model,
            texts.len()
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let ollama_response: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;

        let mut embeddings = ollama_response.embeddings;
        if embeddings.len() != texts.len() {
            return Err(EmbedError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        if let Some(expected) = self.dimension {
            if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
                return Err(EmbedError::MalformedResponse(format!(
                    "expected dimension {}, got {}",
                    expected,
                    bad.len()
                )));
            }
        }

        // Ollama already normalizes /api/embed output; this keeps the
        // contract explicit when the model does not.
        if options.normalize {
            for vector in embeddings.iter_mut() {
                l2_normalize(vector);
            }
        }

        Ok(embeddings)
    }
}
