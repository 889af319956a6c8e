//! Result resolver: maps a task id to its current status and payload.

use std::sync::Arc;

use embed_dispatch_common::{ResultStore, StoreError, TaskStatusResponse};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ResultResolver {
    store: Arc<dyn ResultStore>,
}

impl ResultResolver {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Current status of `task_id`.
    ///
    /// Ids that are not UUIDs are reported as not found without touching
    /// the store.
    pub async fn get_status(&self, task_id: &str) -> Result<TaskStatusResponse, ResolveError> {
        if Uuid::parse_str(task_id).is_err() {
            return Err(ResolveError::NotFound(task_id.to_string()));
        }

        match self.store.get(task_id).await? {
            Some(record) => {
                tracing::debug!(task_id = %task_id, status = %record.status, "Resolved task");
                Ok(TaskStatusResponse::from(record))
            }
            None => Err(ResolveError::NotFound(task_id.to_string())),
        }
    }
}
