//! Worker loops consuming one model queue each.
//!
//! A worker claims a task, runs the model's engine under a watchdog and
//! records exactly one terminal result. The broker message is acknowledged
//! only after the outcome is durable in the result store, so a crash before
//! that point leads to redelivery instead of a lost task.

mod pool;
mod retry;

pub use pool::WorkerPool;
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use embed_dispatch_common::{
    peek_task_id, Broker, BrokerError, ClaimOutcome, Delivery, ErrorKind, ModelDescriptor,
    PutOutcome, ResultStore, StoreError, Task, TaskError, TaskResult,
};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::WorkerConfig;
use crate::engine::{EmbedOptions, Embedder};
use crate::error::Result;

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Embeddings stored, message acked.
    Succeeded,
    /// Terminal failure stored, message acked.
    Failed(ErrorKind),
    /// Next attempt published, message acked.
    Retried { attempt: u32 },
    /// Task already had a terminal result, message acked without work.
    Duplicate,
    /// Message could not be processed and went to the dead-letter queue.
    DeadLettered,
    /// Infrastructure error, message returned to the queue.
    Redelivered,
}

/// Errors that leave the outcome undecided and call for redelivery.
#[derive(Debug, thiserror::Error)]
enum Redeliver {
    #[error("result store: {0}")]
    Store(#[from] StoreError),

    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("shutdown requested before the retry was due")]
    Interrupted,
}

/// A single consumer of one model queue.
pub struct WorkerLoop {
    descriptor: ModelDescriptor,
    engine: Arc<dyn Embedder>,
    broker: Arc<dyn Broker>,
    store: Arc<dyn ResultStore>,
    retry: RetryPolicy,
    max_processing: Duration,
    redelivery_pause: Duration,
    slot: usize,
}

impl WorkerLoop {
    pub fn new(
        descriptor: ModelDescriptor,
        engine: Arc<dyn Embedder>,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ResultStore>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            descriptor,
            engine,
            broker,
            store,
            retry: RetryPolicy::from_config(config),
            max_processing: config.max_processing(),
            redelivery_pause: config.reconnect_delay(),
            slot: 0,
        }
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = slot;
        self
    }

    pub fn model_key(&self) -> &str {
        &self.descriptor.model_key
    }

    pub fn queue(&self) -> &str {
        &self.descriptor.queue_name
    }

    /// Consume the model queue until `shutdown` flips to true.
    ///
    /// A task in flight when shutdown is requested runs to completion.
    /// Returns an error when the consumer cannot be opened or closes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }

        let mut consumer = self.broker.consume(self.queue()).await?;
        tracing::info!(
            model_key = %self.descriptor.model_key,
            queue = %self.descriptor.queue_name,
            slot = self.slot,
            engine = self.engine.engine_type(),
            "Worker consuming"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    tracing::info!(
                        queue = %self.descriptor.queue_name,
                        slot = self.slot,
                        "Worker stopping"
                    );
                    return Ok(());
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(delivery) => {
                            self.settle(delivery, Some(shutdown.clone())).await;
                        }
                        None => {
                            return Err(BrokerError::ConsumeFailed {
                                queue: self.descriptor.queue_name.clone(),
                                reason: "consumer closed".to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }

    /// Process one delivery and settle it with the broker.
    pub async fn handle(&self, delivery: Delivery) -> Outcome {
        self.settle(delivery, None).await
    }

    async fn settle(&self, delivery: Delivery, shutdown: Option<watch::Receiver<bool>>) -> Outcome {
        let task = match Task::decode(&delivery.payload) {
            Ok(task) if task.model_key == self.descriptor.model_key => task,
            Ok(task) => {
                let reason = format!(
                    "task for model '{}' delivered to queue '{}'",
                    task.model_key, self.descriptor.queue_name
                );
                return self.reject(delivery, Some(task.task_id), reason).await;
            }
            Err(e) => {
                let task_id = peek_task_id(&delivery.payload);
                return self
                    .reject(delivery, task_id, format!("undecodable task message: {}", e))
                    .await;
            }
        };

        match self.process(&task, shutdown).await {
            Ok(outcome) => {
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(task_id = %task.task_id, "Failed to ack delivery: {}", e);
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    attempt = task.attempt,
                    "Returning task to queue: {}",
                    e
                );
                if !matches!(e, Redeliver::Interrupted) {
                    tokio::time::sleep(self.redelivery_pause).await;
                }
                if let Err(e) = delivery.nack(true).await {
                    tracing::warn!(task_id = %task.task_id, "Failed to requeue delivery: {}", e);
                }
                Outcome::Redelivered
            }
        }
    }

    async fn process(
        &self,
        task: &Task,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> std::result::Result<Outcome, Redeliver> {
        if let Some(record) = self.store.get(&task.task_id).await? {
            if record.is_terminal() {
                tracing::info!(task_id = %task.task_id, "Skipping task with a terminal result");
                return Ok(Outcome::Duplicate);
            }
            if record.attempt > task.attempt {
                tracing::info!(
                    task_id = %task.task_id,
                    attempt = task.attempt,
                    current = record.attempt,
                    "Skipping superseded attempt"
                );
                return Ok(Outcome::Duplicate);
            }
        }

        if let Some(not_before) = task.not_before {
            if let Ok(wait) = (not_before - Utc::now()).to_std() {
                tracing::debug!(task_id = %task.task_id, "Delaying retry by {:?}", wait);
                if !wait_or_shutdown(wait, shutdown).await {
                    return Err(Redeliver::Interrupted);
                }
            }
        }

        match self.store.mark_started(&task.task_id, task.attempt).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyTerminal => {
                tracing::info!(task_id = %task.task_id, "Skipping task with a terminal result");
                return Ok(Outcome::Duplicate);
            }
            ClaimOutcome::Stale => {
                tracing::info!(task_id = %task.task_id, "Skipping superseded attempt");
                return Ok(Outcome::Duplicate);
            }
        }

        tracing::info!(
            task_id = %task.task_id,
            model_key = %task.model_key,
            attempt = task.attempt,
            texts = task.input.texts.len(),
            slot = self.slot,
            "Task started"
        );

        let options = EmbedOptions::resolve(&self.descriptor, &task.input.params);
        let started = std::time::Instant::now();
        let embedded = timeout(
            self.max_processing,
            self.engine.embed(&task.input.texts, &options),
        )
        .await;

        match embedded {
            Ok(Ok(vectors)) => {
                tracing::info!(
                    task_id = %task.task_id,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Task succeeded"
                );
                self.finish(TaskResult::success(&task.task_id, vectors), Outcome::Succeeded)
                    .await
            }
            Ok(Err(e)) if e.is_retryable() && self.retry.should_retry(task.attempt) => {
                self.requeue(task, e.to_string()).await
            }
            Ok(Err(e)) => {
                tracing::error!(
                    task_id = %task.task_id,
                    attempt = task.attempt,
                    "Task failed: {}",
                    e
                );
                let error = TaskError::new(ErrorKind::InferenceFailure, e.to_string());
                self.finish(
                    TaskResult::failure(&task.task_id, error),
                    Outcome::Failed(ErrorKind::InferenceFailure),
                )
                .await
            }
            Err(_) => {
                tracing::error!(
                    task_id = %task.task_id,
                    limit_secs = self.max_processing.as_secs(),
                    "Task exceeded processing limit"
                );
                let error = TaskError::new(
                    ErrorKind::Timeout,
                    format!("processing exceeded {:?}", self.max_processing),
                );
                self.finish(
                    TaskResult::failure(&task.task_id, error),
                    Outcome::Failed(ErrorKind::Timeout),
                )
                .await
            }
        }
    }

    async fn finish(
        &self,
        result: TaskResult,
        outcome: Outcome,
    ) -> std::result::Result<Outcome, Redeliver> {
        let task_id = result.task_id.clone();
        match self.store.put(result).await? {
            PutOutcome::Written => Ok(outcome),
            PutOutcome::AlreadyTerminal => {
                tracing::info!(task_id = %task_id, "Result already recorded by another worker");
                Ok(Outcome::Duplicate)
            }
        }
    }

    async fn requeue(&self, task: &Task, reason: String) -> std::result::Result<Outcome, Redeliver> {
        let delay = self.retry.backoff(task.attempt);
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let next = task.next_attempt(not_before);

        let payload = match next.encode() {
            Ok(payload) => payload,
            Err(e) => {
                let error = TaskError::new(ErrorKind::InferenceFailure, reason);
                tracing::error!(task_id = %task.task_id, "Failed to encode retry: {}", e);
                return self
                    .finish(
                        TaskResult::failure(&task.task_id, error),
                        Outcome::Failed(ErrorKind::InferenceFailure),
                    )
                    .await;
            }
        };

        let claim = self.store.mark_requeued(&task.task_id, next.attempt).await?;
        if claim != ClaimOutcome::Claimed {
            return Ok(Outcome::Duplicate);
        }
        self.broker.publish(self.queue(), payload).await?;

        tracing::warn!(
            task_id = %task.task_id,
            attempt = next.attempt,
            max_retries = self.retry.max_retries(),
            backoff_ms = delay.as_millis() as u64,
            "Retrying task: {}",
            reason
        );
        Ok(Outcome::Retried {
            attempt: next.attempt,
        })
    }

    async fn reject(&self, delivery: Delivery, task_id: Option<String>, reason: String) -> Outcome {
        tracing::error!(
            queue = %self.descriptor.queue_name,
            task_id = ?task_id,
            "Dead-lettering malformed task: {}",
            reason
        );

        if let Some(task_id) = task_id {
            let error = TaskError::new(ErrorKind::MalformedTask, reason);
            if let Err(e) = self.store.put(TaskResult::failure(&task_id, error)).await {
                if !delivery.redelivered {
                    // Requeue once before dead-lettering.
                    tracing::warn!(
                        task_id = %task_id,
                        "Failed to record malformed task failure, requeueing once: {}",
                        e
                    );
                    tokio::time::sleep(self.redelivery_pause).await;
                    if let Err(e) = delivery.nack(true).await {
                        tracing::warn!(task_id = %task_id, "Failed to requeue delivery: {}", e);
                    }
                    return Outcome::Redelivered;
                }
                tracing::error!(
                    task_id = %task_id,
                    "Failed to record malformed task failure, task stays non-terminal until expiry: {}",
                    e
                );
            }
        }

        if let Err(e) = delivery.nack(false).await {
            tracing::warn!(queue = %self.descriptor.queue_name, "Failed to dead-letter delivery: {}", e);
        }
        Outcome::DeadLettered
    }
}

/// Sleep for `wait`, returning false if shutdown is requested first.
async fn wait_or_shutdown(wait: Duration, shutdown: Option<watch::Receiver<bool>>) -> bool {
    let Some(mut shutdown) = shutdown else {
        tokio::time::sleep(wait).await;
        return true;
    };

    tokio::select! {
        _ = tokio::time::sleep(wait) => true,
        Ok(()) = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => false,
    }
}
