//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ModelDescriptor, RuntimeParams};
use crate::task::{Embeddings, TaskError, TaskRecord, TaskStatus};

/// Request to embed a single text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model_key: String,
    pub text: String,
    /// Per-request overrides of the model's runtime parameters.
    #[serde(default)]
    pub params: RuntimeParams,
}

/// Request to embed several texts in one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbeddingRequest {
    pub model_key: String,
    pub texts: Vec<String>,
    #[serde(default)]
    pub params: RuntimeParams,
}

/// Response to a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: String,
    pub model_key: String,
    /// Display name of the model serving the task.
    pub model_name: String,
    pub status: TaskStatus,
}

/// Current state of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// Number of requeues so far.
    pub attempt: u32,
    /// Embedding vectors, once the task succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Embeddings>,
    /// Failure detail, once the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRecord> for TaskStatusResponse {
    fn from(record: TaskRecord) -> Self {
        let (result, error, completed_at) = match record.result {
            Some(r) => (r.output, r.error, Some(r.completed_at)),
            None => (None, None, None),
        };
        Self {
            task_id: record.task_id,
            status: record.status,
            attempt: record.attempt,
            result,
            error,
            completed_at,
        }
    }
}

/// Discovery entry for one embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_key: String,
    pub name: String,
    pub queue: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub max_sequence_length: Option<usize>,
    pub description: String,
    pub version: String,
}

impl From<&ModelDescriptor> for ModelInfo {
    fn from(descriptor: &ModelDescriptor) -> Self {
        Self {
            model_key: descriptor.model_key.clone(),
            name: descriptor.display_name.clone(),
            queue: descriptor.queue_name.clone(),
            dimension: descriptor.embedding_dim(),
            max_sequence_length: descriptor.max_seq_length(),
            description: descriptor.description.clone(),
            version: descriptor.version.clone(),
        }
    }
}
