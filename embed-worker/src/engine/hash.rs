//! Feature-hashing embedding engine.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dimension` buckets with a +1/-1 sign. Output is deterministic, needs no
//! model files, and texts sharing tokens land close together.

use async_trait::async_trait;
use embed_dispatch_common::Embeddings;
use sha2::{Digest, Sha256};

use super::{l2_normalize, validate_texts, EmbedError, EmbedOptions, Embedder, EngineHealth};

/// Dimension used when a model does not set `embedding_dim`.
pub const DEFAULT_DIMENSION: usize = 384;

/// Token cap used when a model does not set `max_seq_length`.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 256;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed one text without normalization.
    pub fn embed_text(&self, text: &str, max_tokens: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text).take(max_tokens) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn engine_type(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        Ok(EngineHealth {
            is_healthy: true,
            version: None,
            models: vec![],
        })
    }

    async fn embed(
        &self,
        texts: &[String],
        options: &EmbedOptions,
    ) -> Result<Embeddings, EmbedError> {
        validate_texts(texts)?;

        let embedder = self.clone();
        let texts = texts.to_vec();
        let normalize = options.normalize;
        let max_tokens = options.max_seq_length.unwrap_or(DEFAULT_MAX_SEQ_LENGTH);

        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| {
                    let mut vector = embedder.embed_text(text, max_tokens);
                    if normalize {
                        l2_normalize(&mut vector);
                    }
                    vector
                })
                .collect::<Embeddings>()
        })
        .await
        .map_err(|e| EmbedError::Internal(format!("embedding thread failed: {}", e)))
    }
}
