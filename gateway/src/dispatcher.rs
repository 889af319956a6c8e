//! Task dispatcher: validates a request, creates the task and publishes it
//! to the model's queue.

use std::sync::Arc;

use embed_dispatch_common::{
    Broker, EmbeddingInput, ModelDescriptor, QueueRouter, RegistryError, ResultStore, Task,
    TaskAccepted, TaskStatus,
};

/// Errors from task submission.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to enqueue task: {0}")]
    DispatchFailed(String),
}

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownModel(key) => DispatchError::UnknownModel(key),
            other => DispatchError::DispatchFailed(other.to_string()),
        }
    }
}

/// Creates tasks and hands them to the broker.
pub struct TaskDispatcher {
    router: QueueRouter,
    broker: Arc<dyn Broker>,
    store: Arc<dyn ResultStore>,
    max_batch_size: usize,
}

impl TaskDispatcher {
    pub fn new(
        router: QueueRouter,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ResultStore>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            router,
            broker,
            store,
            max_batch_size,
        }
    }

    /// Submit an embedding task for `model_key`.
    ///
    /// On success the task is enqueued and recorded as PENDING. On any error
    /// nothing is left behind: no queued message and no status record.
    pub async fn submit(
        &self,
        model_key: &str,
        input: EmbeddingInput,
    ) -> Result<TaskAccepted, DispatchError> {
        let descriptor = self.router.registry().resolve(model_key)?;
        let queue = self.router.route(model_key)?;
        self.validate(&input)?;

        let task = Task::new(model_key, input);
        let payload = task
            .encode()
            .map_err(|e| DispatchError::DispatchFailed(format!("failed to encode task: {}", e)))?;

        self.store
            .mark_pending(&task.task_id)
            .await
            .map_err(|e| DispatchError::DispatchFailed(e.to_string()))?;

        if let Err(e) = self.broker.publish(queue, payload).await {
            tracing::error!(
                task_id = %task.task_id,
                model_key = %model_key,
                queue = %queue,
                "Failed to publish task: {}",
                e
            );
            if let Err(discard_err) = self.store.discard(&task.task_id).await {
                tracing::warn!(
                    task_id = %task.task_id,
                    "Failed to remove pending marker: {}",
                    discard_err
                );
            }
            return Err(DispatchError::DispatchFailed(e.to_string()));
        }

        tracing::info!(
            task_id = %task.task_id,
            model_key = %model_key,
            queue = %queue,
            texts = task.input.texts.len(),
            "Task dispatched"
        );

        Ok(accepted(&task, descriptor))
    }

    fn validate(&self, input: &EmbeddingInput) -> Result<(), DispatchError> {
        if input.texts.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "at least one text is required".to_string(),
            ));
        }
        if input.texts.len() > self.max_batch_size {
            return Err(DispatchError::InvalidRequest(format!(
                "batch of {} texts exceeds the limit of {}",
                input.texts.len(),
                self.max_batch_size
            )));
        }
        if let Some(index) = input.texts.iter().position(|t| t.trim().is_empty()) {
            return Err(DispatchError::InvalidRequest(format!(
                "text at index {} is empty",
                index
            )));
        }
        Ok(())
    }
}

fn accepted(task: &Task, descriptor: &ModelDescriptor) -> TaskAccepted {
    TaskAccepted {
        task_id: task.task_id.clone(),
        model_key: task.model_key.clone(),
        model_name: descriptor.display_name.clone(),
        status: TaskStatus::Pending,
    }
}
