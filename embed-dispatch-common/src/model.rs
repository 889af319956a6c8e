//! Embedding model descriptors and their runtime parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar runtime parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Str(s) => match s.to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Scalar::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Runtime parameters keyed by name.
pub type RuntimeParams = BTreeMap<String, Scalar>;

/// Well-known runtime parameter names.
pub mod params {
    /// Output vector length.
    pub const EMBEDDING_DIM: &str = "embedding_dim";

    /// Maximum number of tokens considered per input text.
    pub const MAX_SEQ_LENGTH: &str = "max_seq_length";

    /// Whether output vectors are L2-normalized.
    pub const NORMALIZE: &str = "normalize";

    /// Backend model name, for engines that serve several models.
    pub const MODEL: &str = "model";
}

/// Embedding backend serving a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Deterministic feature-hashing embedder running on the worker's CPU.
    #[default]
    Hash,
    /// Ollama server reached over HTTP.
    Ollama,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable description of one embedding model and its dedicated queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Logical model identifier used by clients.
    pub model_key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Queue carrying this model's tasks.
    pub queue_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default)]
    pub runtime_params: RuntimeParams,
}

impl ModelDescriptor {
    pub fn param(&self, key: &str) -> Option<&Scalar> {
        self.runtime_params.get(key)
    }

    pub fn embedding_dim(&self) -> Option<usize> {
        self.param(params::EMBEDDING_DIM)
            .and_then(Scalar::as_i64)
            .and_then(|d| usize::try_from(d).ok())
    }

    pub fn max_seq_length(&self) -> Option<usize> {
        self.param(params::MAX_SEQ_LENGTH)
            .and_then(Scalar::as_i64)
            .and_then(|d| usize::try_from(d).ok())
    }
}

/// Model entry as written in the configuration file.
///
/// `queue_name` and `display_name` fall back to values derived from the
/// model key when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default)]
    pub params: RuntimeParams,
}
