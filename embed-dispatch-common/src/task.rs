//! Task messages, the task status state machine and task results.
//!
//! # Lifecycle
//!
//! ```text
//! PENDING -> STARTED -> SUCCESS
//!               |   \-> FAILURE
//!               v
//!            PENDING (retryable failure, while retries remain)
//! ```
//!
//! SUCCESS and FAILURE are terminal: once a result carrying one of them is
//! stored it is never replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::RuntimeParams;

/// One embedding vector per input text.
pub type Embeddings = Vec<Vec<f32>>;

/// Generate a fresh task identifier (random 128-bit UUID).
pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

/// Status of a task as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Enqueued, not yet claimed by a worker (or waiting for a retry).
    Pending,
    /// Claimed by a worker, inference in progress.
    Started,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownModel,
    DispatchFailed,
    MalformedTask,
    InferenceFailure,
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownModel => "unknown_model",
            Self::DispatchFailed => "dispatch_failed",
            Self::MalformedTask => "malformed_task",
            Self::InferenceFailure => "inference_failure",
            Self::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Error detail carried by a failed task result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Texts to embed plus per-request parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
    #[serde(default)]
    pub params: RuntimeParams,
}

impl EmbeddingInput {
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            params: RuntimeParams::new(),
        }
    }

    pub fn batch(texts: Vec<String>) -> Self {
        Self {
            texts,
            params: RuntimeParams::new(),
        }
    }
}

/// Task message published to a model queue.
///
/// The retry counter travels with the message: a requeued task is a new
/// message with `attempt + 1` and a `not_before` instant carrying the backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub model_key: String,
    pub input: EmbeddingInput,
    pub submitted_at: DateTime<Utc>,
    /// Zero for the first delivery, incremented on each requeue.
    #[serde(default)]
    pub attempt: u32,
    /// Earliest instant a worker may start this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(model_key: impl Into<String>, input: EmbeddingInput) -> Self {
        Self {
            task_id: new_task_id(),
            model_key: model_key.into(),
            input,
            submitted_at: Utc::now(),
            attempt: 0,
            not_before: None,
        }
    }

    /// The message to publish for the next attempt.
    pub fn next_attempt(&self, not_before: DateTime<Utc>) -> Self {
        Self {
            attempt: self.attempt + 1,
            not_before: Some(not_before),
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Best-effort extraction of the task id from a payload that failed to decode.
pub fn peek_task_id(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let id = value.get("task_id")?.as_str()?;
    Uuid::parse_str(id).ok().map(|_| id.to_string())
}

/// Final outcome of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    /// Present only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Embeddings>,
    /// Present only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, output: Embeddings) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Success,
            output: Some(output),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(task_id: impl Into<String>, error: TaskError) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failure,
            output: None,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }
}

/// What the result store keeps for a task: its latest status and, once
/// terminal, the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub attempt: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl TaskRecord {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            attempt: 0,
            updated_at: Utc::now(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
